//! Read-through cache over an external credential store.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::{Certificate, CertificateLoadError};
use crate::config::{CertificateClass, EnvironmentType};

/// Raw certificate strings as the credential store keeps them.
#[derive(Clone, Default)]
pub struct CertificateMaterial {
    pub certificate: String,
    pub private_key: String,
    pub secret: String,
}

impl std::fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("certificate_len", &self.certificate.len())
            .finish_non_exhaustive()
    }
}

/// Where certificate material lives. Implemented by the caller.
pub trait CertificateSource {
    fn fetch(
        &self,
        env: EnvironmentType,
        class: CertificateClass,
    ) -> Result<CertificateMaterial, CertificateLoadError>;
}

impl<F> CertificateSource for F
where
    F: Fn(EnvironmentType, CertificateClass) -> Result<CertificateMaterial, CertificateLoadError>,
{
    fn fetch(
        &self,
        env: EnvironmentType,
        class: CertificateClass,
    ) -> Result<CertificateMaterial, CertificateLoadError> {
        self(env, class)
    }
}

type CacheKey = (EnvironmentType, CertificateClass);

/// Loads each `(environment, class)` certificate once and hands out shared
/// snapshots.
///
/// # Examples
/// ```rust,no_run
/// use fatoora_sign::certificate::store::{CachedCertificates, CertificateMaterial};
/// use fatoora_sign::certificate::CertificateLoadError;
/// use fatoora_sign::config::{CertificateClass, EnvironmentType};
///
/// let cache = CachedCertificates::new(|_env: EnvironmentType, _class: CertificateClass| {
///     Ok::<_, CertificateLoadError>(CertificateMaterial {
///         certificate: std::fs::read_to_string("csid.pem").unwrap_or_default(),
///         private_key: std::fs::read_to_string("key.pem").unwrap_or_default(),
///         secret: "secret".into(),
///     })
/// });
/// let certificate = cache.get(EnvironmentType::Simulation, CertificateClass::Production)?;
/// # Ok::<(), CertificateLoadError>(())
/// ```
pub struct CachedCertificates<S> {
    source: S,
    loaded: RwLock<HashMap<CacheKey, Arc<Certificate>>>,
}

impl<S: CertificateSource> CachedCertificates<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(
        &self,
        env: EnvironmentType,
        class: CertificateClass,
    ) -> Result<Arc<Certificate>, CertificateLoadError> {
        {
            let loaded = self.loaded.read().unwrap_or_else(|e| e.into_inner());
            if let Some(certificate) = loaded.get(&(env, class)) {
                return Ok(Arc::clone(certificate));
            }
        }

        debug!(env = env.as_str(), class = class.as_str(), "loading certificate");
        let material = self.source.fetch(env, class)?;
        let certificate = Arc::new(Certificate::load(
            &material.certificate,
            &material.private_key,
            material.secret,
        )?);

        let mut loaded = self.loaded.write().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(
            loaded.entry((env, class)).or_insert(certificate),
        ))
    }

    /// Drop one entry, e.g. after the CSID was renewed.
    pub fn invalidate(&self, env: EnvironmentType, class: CertificateClass) {
        self.loaded
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(env, class));
    }

    pub fn clear(&self) {
        self.loaded.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::test_support::{certificate_pem, key_pem, signing_key};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
    }

    impl CertificateSource for CountingSource {
        fn fetch(
            &self,
            env: EnvironmentType,
            _class: CertificateClass,
        ) -> Result<CertificateMaterial, CertificateLoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if env == EnvironmentType::Production {
                return Err(CertificateLoadError::Source("no production CSID".into()));
            }
            let key = signing_key();
            Ok(CertificateMaterial {
                certificate: certificate_pem(&key),
                private_key: key_pem(&key),
                secret: "secret".into(),
            })
        }
    }

    #[test]
    fn loads_once_per_key() {
        let cache = CachedCertificates::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let a = cache
            .get(EnvironmentType::Simulation, CertificateClass::Onboarding)
            .unwrap();
        let b = cache
            .get(EnvironmentType::Simulation, CertificateClass::Onboarding)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 1);

        cache.invalidate(EnvironmentType::Simulation, CertificateClass::Onboarding);
        let c = cache
            .get(EnvironmentType::Simulation, CertificateClass::Onboarding)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 2);

        cache.clear();
        cache
            .get(EnvironmentType::Simulation, CertificateClass::Onboarding)
            .unwrap();
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn source_errors_are_not_cached() {
        let cache = CachedCertificates::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        for _ in 0..2 {
            let err = cache
                .get(EnvironmentType::Production, CertificateClass::Production)
                .unwrap_err();
            assert!(matches!(err, CertificateLoadError::Source(_)));
        }
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn closures_are_sources() {
        let cache = CachedCertificates::new(|_env: EnvironmentType, _class: CertificateClass| {
            Err::<CertificateMaterial, _>(CertificateLoadError::UnrecognizedEncoding)
        });
        assert!(cache
            .get(EnvironmentType::NonProduction, CertificateClass::Onboarding)
            .is_err());
    }
}
