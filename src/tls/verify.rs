//! Peer certificate identity and hostname verification.
//!
//! Matching is exact string equality against the subject's commonName, or
//! its organizationName for certificates issued by older broker setups.
//! There is no wildcard matching and no subjectAltName lookup.

use x509_parser::x509::X509Name;

use crate::error::{Result, WireError};

/// Subject attribute type for commonName.
pub const COMMON_NAME: &str = "commonName";

/// Subject attribute type for organizationName.
pub const ORGANIZATION_NAME: &str = "organizationName";

/// One `type=value` pair of a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAttribute {
    /// Attribute type, e.g. `commonName`; unknown types keep the dotted OID.
    pub attr_type: String,
    /// Attribute value.
    pub value: String,
}

impl NameAttribute {
    /// Build an attribute from its parts.
    pub fn new(attr_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attr_type: attr_type.into(),
            value: value.into(),
        }
    }
}

/// Fields of the certificate the server presented in the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    /// Subject attributes in certificate order.
    pub subject: Vec<NameAttribute>,
    /// Issuer attributes in certificate order.
    pub issuer: Vec<NameAttribute>,
    /// Serial number as colon-separated hex.
    pub serial_number: String,
    /// Start of validity, seconds since the Unix epoch.
    pub not_before: i64,
    /// End of validity, seconds since the Unix epoch.
    pub not_after: i64,
}

impl PeerCertificate {
    /// Parse a DER-encoded X.509 certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| WireError::Certificate(format!("failed to parse peer certificate: {e}")))?;

        Ok(Self {
            subject: name_attributes(cert.subject()),
            issuer: name_attributes(cert.issuer()),
            serial_number: cert.raw_serial_as_string(),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
        })
    }

    /// Check the subject against `expected`.
    pub fn verify_hostname(&self, expected: &str) -> Result<()> {
        verify_hostname(&self.subject, expected)
    }
}

/// ASN.1 universal tag number of BMPString.
const BMP_STRING_TAG: u32 = 30;

/// Text attributes of `name`. Values that are not character strings are
/// skipped; they can never name a host.
fn name_attributes(name: &X509Name<'_>) -> Vec<NameAttribute> {
    name.iter_attributes()
        .filter_map(|attr| {
            let oid = attr.attr_type().to_id_string();
            let value = match attr.as_str() {
                Ok(value) => value.to_string(),
                Err(_) => {
                    let raw = attr.attr_value();
                    if raw.header.tag().0 != BMP_STRING_TAG {
                        tracing::debug!(oid = %oid, "skipping non-text name attribute");
                        return None;
                    }
                    decode_bmp_string(raw.data)?
                }
            };
            Some(NameAttribute::new(attribute_name(&oid).unwrap_or(&oid), value))
        })
        .collect()
}

/// Decode big-endian UTF-16 (BMPString) content.
fn decode_bmp_string(data: &[u8]) -> Option<String> {
    if data.len() % 2 != 0 {
        return None;
    }
    let units = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
}

fn attribute_name(oid: &str) -> Option<&'static str> {
    Some(match oid {
        "2.5.4.3" => COMMON_NAME,
        "2.5.4.10" => ORGANIZATION_NAME,
        "2.5.4.11" => "organizationalUnitName",
        "2.5.4.6" => "countryName",
        "2.5.4.7" => "localityName",
        "2.5.4.8" => "stateOrProvinceName",
        "1.2.840.113549.1.9.1" => "emailAddress",
        _ => return None,
    })
}

/// Accept the subject if a commonName or organizationName equals
/// `expected` exactly.
///
/// # Errors
///
/// `InvalidHostname` carrying `expected` when the subject is empty or no
/// attribute matches. The session must not be used after this error.
pub fn verify_hostname(subject: &[NameAttribute], expected: &str) -> Result<()> {
    let matched = subject.iter().any(|attr| {
        (attr.attr_type == COMMON_NAME || attr.attr_type == ORGANIZATION_NAME)
            && attr.value == expected
    });

    if matched {
        tracing::debug!(hostname = expected, "peer certificate hostname verified");
        Ok(())
    } else {
        tracing::warn!(
            hostname = expected,
            subject = ?subject,
            "peer certificate does not match hostname"
        );
        Err(WireError::InvalidHostname(expected.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BmpString, CertificateParams, DistinguishedName, DnType, DnValue, KeyPair};

    fn certificate(subject: &[(DnType, &str)]) -> PeerCertificate {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name = DistinguishedName::new();
        for (ty, value) in subject {
            params.distinguished_name.push(ty.clone(), *value);
        }
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        PeerCertificate::from_der(cert.der()).unwrap()
    }

    #[test]
    fn test_common_name_match() {
        let cert = certificate(&[(DnType::CommonName, "example.com")]);
        assert_eq!(cert.subject, vec![NameAttribute::new(COMMON_NAME, "example.com")]);
        cert.verify_hostname("example.com").unwrap();
    }

    #[test]
    fn test_organization_name_match() {
        let cert = certificate(&[(DnType::OrganizationName, "example.com")]);
        cert.verify_hostname("example.com").unwrap();
    }

    #[test]
    fn test_common_name_mismatch() {
        let cert = certificate(&[(DnType::CommonName, "other.com")]);
        let err = cert.verify_hostname("example.com").unwrap_err();
        assert!(matches!(err, WireError::InvalidHostname(ref h) if h == "example.com"));
        assert!(err.to_string().contains("example.com"));
        assert!(err.is_security());
    }

    #[test]
    fn test_empty_subject_rejected() {
        let cert = certificate(&[]);
        assert!(cert.subject.is_empty());
        let err = cert.verify_hostname("example.com").unwrap_err();
        assert!(matches!(err, WireError::InvalidHostname(_)));
    }

    #[test]
    fn test_match_is_exact() {
        let subject = vec![
            NameAttribute::new(COMMON_NAME, "Example.com"),
            NameAttribute::new(COMMON_NAME, "*.example.com"),
            NameAttribute::new("organizationalUnitName", "example.com"),
        ];
        assert!(verify_hostname(&subject, "example.com").is_err());
        assert!(verify_hostname(&subject, "www.example.com").is_err());
    }

    #[test]
    fn test_any_matching_attribute_accepted() {
        let cert = certificate(&[
            (DnType::CountryName, "US"),
            (DnType::OrganizationName, "Broker Inc"),
            (DnType::CommonName, "broker.internal"),
        ]);
        assert_eq!(cert.subject[0], NameAttribute::new("countryName", "US"));
        cert.verify_hostname("broker.internal").unwrap();
        cert.verify_hostname("Broker Inc").unwrap();
    }

    #[test]
    fn test_certificate_metadata() {
        let cert = certificate(&[(DnType::CommonName, "example.com")]);
        assert_eq!(cert.issuer, cert.subject);
        assert!(!cert.serial_number.is_empty());
        assert!(cert.not_before < cert.not_after);
    }

    #[test]
    fn test_bmp_string_common_name_match() {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(
            DnType::CommonName,
            DnValue::BmpString(BmpString::try_from("example.com").unwrap()),
        );
        let key = KeyPair::generate().unwrap();
        let cert = PeerCertificate::from_der(params.self_signed(&key).unwrap().der()).unwrap();

        assert_eq!(cert.subject, vec![NameAttribute::new(COMMON_NAME, "example.com")]);
        cert.verify_hostname("example.com").unwrap();
    }

    #[test]
    fn test_decode_bmp_string() {
        assert_eq!(
            decode_bmp_string(&[0x00, b'h', 0x00, b'i', 0x00, 0xE9]).as_deref(),
            Some("hi\u{e9}")
        );
        assert_eq!(decode_bmp_string(&[0x00, b'h', 0x00]), None);
        // Unpaired high surrogate.
        assert_eq!(decode_bmp_string(&[0xD8, 0x00]), None);
    }

    #[test]
    fn test_garbage_der_rejected() {
        let err = PeerCertificate::from_der(b"not a certificate").unwrap_err();
        assert!(matches!(err, WireError::Certificate(_)));
    }
}
