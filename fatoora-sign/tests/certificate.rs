mod common;

use base64ct::{Base64, Encoding};
use fatoora_sign::certificate::store::{CachedCertificates, CertificateMaterial};
use fatoora_sign::certificate::{Certificate, CertificateEncoding, CertificateLoadError};
use fatoora_sign::config::{CertificateClass, Config, EnvironmentType};
use fatoora_sign::invoice::sign::{InvoiceSigner, SigningErrorKind};
use pretty_assertions::assert_eq;

fn pem_body(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn every_supported_encoding_loads_the_same_certificate() {
    let key = common::signing_key();
    let pem = common::certificate_pem(&key);
    let body = pem_body(&pem);
    let single_line = body.replace('\n', "");
    let double = Base64::encode_string(single_line.as_bytes());

    let cases = [
        (pem.as_str(), CertificateEncoding::Pem),
        (single_line.as_str(), CertificateEncoding::Base64),
        (double.as_str(), CertificateEncoding::DoubleBase64),
        (body.as_str(), CertificateEncoding::SyntheticPem),
    ];
    let reference = Certificate::load(&pem, "", "").expect("pem");
    for (raw, encoding) in cases {
        let cert = Certificate::load(raw, "", "").expect("load");
        assert_eq!(cert.encoding(), encoding, "{raw}");
        assert_eq!(cert.as_base64(), reference.as_base64());
        assert_eq!(cert.cert_digest(), reference.cert_digest());
    }
}

#[test]
fn issuer_and_serial_come_from_the_certificate() {
    let cert = common::certificate();
    assert_eq!(cert.issuer_name(), "CN=Fatoora Test CA");
    // 0x0f4240
    assert_eq!(cert.serial_number_decimal(), "1000000");
    assert!(cert.has_private_key());
    assert_eq!(cert.secret(), "secret");
}

#[test]
fn garbage_is_unrecognized() {
    let err = Certificate::load("not a certificate", "", "").unwrap_err();
    assert_eq!(err, CertificateLoadError::UnrecognizedEncoding);
}

#[test]
fn signer_resolves_its_certificate_from_the_store() {
    let key = common::signing_key();
    let material = CertificateMaterial {
        certificate: common::certificate_pem(&key),
        private_key: common::key_pem(&key),
        secret: "secret".into(),
    };
    let store = CachedCertificates::new(move |env: EnvironmentType, class: CertificateClass| {
        match (env, class) {
            (EnvironmentType::Simulation, CertificateClass::Production) => Ok(material.clone()),
            _ => Err(CertificateLoadError::Source(format!(
                "no certificate for {} / {}",
                env.as_str(),
                class.as_str()
            ))),
        }
    });

    let config = Config::new(EnvironmentType::Simulation)
        .with_certificate_class(CertificateClass::Production);
    let signer = InvoiceSigner::from_store(&store, config).expect("signer");
    common::simplified_invoice().sign(&signer).expect("sign");

    let err = InvoiceSigner::from_store(&store, Config::default()).unwrap_err();
    assert_eq!(err.kind(), SigningErrorKind::CertificateLoad);
}
