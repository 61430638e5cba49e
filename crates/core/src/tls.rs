//! TLS 인증서 번들 생성
//!
//! Wazuh indexer/manager/dashboard가 사용하는 자체 서명 루트 CA와
//! 서비스별 leaf 인증서를 생성합니다. `openssl` CLI 호출을 대체합니다.
//!
//! # 파일 배치
//!
//! ```text
//! certs/
//! ├── root-ca.pem
//! ├── root-ca-key.pem
//! ├── <leaf>.pem
//! └── <leaf>-key.pem
//! ```
//!
//! 번들은 항상 통째로 생성됩니다. 파일이 하나라도 빠지면 CA부터 다시 만들며,
//! 기존 CA로 새 leaf만 서명하는 경로는 두지 않습니다.

use std::path::Path;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, KeyUsagePurpose,
};
use tracing::{debug, info};

use crate::error::{BtpiError, TlsError};

/// 인증서 DN의 조직 이름
pub const ORGANIZATION: &str = "BTPI-REACT";
/// 인증서 DN의 조직 단위
pub const ORGANIZATIONAL_UNIT: &str = "BTPI";

const CA_CERT_FILE: &str = "root-ca.pem";
const CA_KEY_FILE: &str = "root-ca-key.pem";

/// leaf 인증서 정의
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSpec {
    /// 파일 이름과 CN으로 쓰이는 이름
    pub name: String,
    /// Subject Alternative Names (DNS 이름 또는 IP)
    pub sans: Vec<String>,
}

impl LeafSpec {
    pub fn new(name: impl Into<String>, sans: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            sans: sans.into_iter().map(Into::into).collect(),
        }
    }

    /// OpenSearch 보안 플러그인이 기대하는 형식의 DN 문자열
    pub fn distinguished_name(&self) -> String {
        format!(
            "CN={},OU={ORGANIZATIONAL_UNIT},O={ORGANIZATION}",
            self.name
        )
    }

    fn validate(&self) -> Result<(), TlsError> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(TlsError::InvalidSpec(format!(
                "leaf name '{}' must be non-empty and contain only [A-Za-z0-9._-]",
                self.name
            )));
        }
        if self.name == "root-ca" {
            return Err(TlsError::InvalidSpec(
                "leaf name 'root-ca' is reserved".to_owned(),
            ));
        }
        Ok(())
    }
}

/// CA가 서명한 leaf 인증서
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub name: String,
    pub cert_pem: String,
    pub key_pem: String,
}

/// 루트 CA와 leaf 인증서 묶음
#[derive(Debug, Clone)]
pub struct CertificateBundle {
    pub ca_cert_pem: String,
    pub ca_key_pem: String,
    pub leaves: Vec<IssuedCertificate>,
}

impl CertificateBundle {
    /// 새 CA와 leaf 인증서들을 생성합니다.
    pub fn generate(ca_common_name: &str, leaves: &[LeafSpec]) -> Result<Self, TlsError> {
        for leaf in leaves {
            leaf.validate()?;
        }
        let mut seen = std::collections::BTreeSet::new();
        for leaf in leaves {
            if !seen.insert(leaf.name.as_str()) {
                return Err(TlsError::InvalidSpec(format!(
                    "duplicate leaf name '{}'",
                    leaf.name
                )));
            }
        }

        let gen_err = |name: &str, e: rcgen::Error| TlsError::Generation {
            name: name.to_owned(),
            reason: e.to_string(),
        };

        let ca_key = KeyPair::generate().map_err(|e| gen_err(ca_common_name, e))?;
        let mut ca_params =
            CertificateParams::new(Vec::<String>::new()).map_err(|e| gen_err(ca_common_name, e))?;
        ca_params.distinguished_name = distinguished_name(ca_common_name);
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_cert = ca_params
            .self_signed(&ca_key)
            .map_err(|e| gen_err(ca_common_name, e))?;

        let mut issued = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            let key = KeyPair::generate().map_err(|e| gen_err(leaf.name.as_str(), e))?;
            let mut params =
                CertificateParams::new(leaf.sans.clone()).map_err(|e| gen_err(leaf.name.as_str(), e))?;
            params.distinguished_name = distinguished_name(&leaf.name);
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ];
            params.extended_key_usages = vec![
                ExtendedKeyUsagePurpose::ServerAuth,
                ExtendedKeyUsagePurpose::ClientAuth,
            ];
            let cert = params
                .signed_by(&key, &ca_cert, &ca_key)
                .map_err(|e| gen_err(leaf.name.as_str(), e))?;
            debug!(leaf = leaf.name.as_str(), sans = ?leaf.sans, "issued leaf certificate");
            issued.push(IssuedCertificate {
                name: leaf.name.clone(),
                cert_pem: cert.pem(),
                key_pem: key.serialize_pem(),
            });
        }

        Ok(Self {
            ca_cert_pem: ca_cert.pem(),
            ca_key_pem: ca_key.serialize_pem(),
            leaves: issued,
        })
    }

    /// 디렉토리에 PEM 파일로 기록합니다. 개인 키는 unix에서 0600 권한.
    pub async fn write_to(&self, dir: impl AsRef<Path>) -> Result<(), BtpiError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        tokio::fs::write(dir.join(CA_CERT_FILE), &self.ca_cert_pem).await?;
        write_private_key(&dir.join(CA_KEY_FILE), &self.ca_key_pem).await?;
        for leaf in &self.leaves {
            tokio::fs::write(dir.join(format!("{}.pem", leaf.name)), &leaf.cert_pem).await?;
            write_private_key(&dir.join(format!("{}-key.pem", leaf.name)), &leaf.key_pem).await?;
        }
        info!(
            dir = %dir.display(),
            leaves = self.leaves.len(),
            "certificate bundle written"
        );
        Ok(())
    }
}

/// 번들을 구성하는 파일이 모두 있는지 확인합니다.
pub fn bundle_complete(dir: impl AsRef<Path>, leaf_names: &[&str]) -> bool {
    let dir = dir.as_ref();
    let mut files = vec![CA_CERT_FILE.to_owned(), CA_KEY_FILE.to_owned()];
    for name in leaf_names {
        files.push(format!("{name}.pem"));
        files.push(format!("{name}-key.pem"));
    }
    files.iter().all(|f| dir.join(f).is_file())
}

/// 번들이 불완전하거나 `force`이면 새로 생성합니다.
///
/// 생성했으면 `true`, 기존 번들을 그대로 두었으면 `false`를 반환합니다.
pub async fn ensure_bundle(
    dir: impl AsRef<Path>,
    ca_common_name: &str,
    leaves: &[LeafSpec],
    force: bool,
) -> Result<bool, BtpiError> {
    let dir = dir.as_ref();
    let names: Vec<&str> = leaves.iter().map(|l| l.name.as_str()).collect();
    if !force && bundle_complete(dir, &names) {
        debug!(dir = %dir.display(), "certificate bundle already complete");
        return Ok(false);
    }
    let bundle = CertificateBundle::generate(ca_common_name, leaves)?;
    bundle.write_to(dir).await?;
    Ok(true)
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn.push(DnType::OrganizationalUnitName, ORGANIZATIONAL_UNIT);
    dn.push(DnType::OrganizationName, ORGANIZATION);
    dn
}

async fn write_private_key(path: &Path, pem: &str) -> std::io::Result<()> {
    tokio::fs::write(path, pem).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves() -> Vec<LeafSpec> {
        vec![
            LeafSpec::new("wazuh-indexer", ["wazuh-indexer", "localhost", "127.0.0.1"]),
            LeafSpec::new("admin", Vec::<String>::new()),
        ]
    }

    #[test]
    fn generate_produces_pem_for_ca_and_leaves() {
        let bundle = CertificateBundle::generate("BTPI Root CA", &leaves()).unwrap();
        assert!(bundle.ca_cert_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(bundle.ca_key_pem.contains("PRIVATE KEY"));
        assert_eq!(bundle.leaves.len(), 2);
        assert_eq!(bundle.leaves[0].name, "wazuh-indexer");
        assert!(bundle.leaves[1].cert_pem.contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn generate_rejects_invalid_leaf_name() {
        let err =
            CertificateBundle::generate("ca", &[LeafSpec::new("../etc", ["x"])]).unwrap_err();
        assert!(matches!(err, TlsError::InvalidSpec(_)));
    }

    #[test]
    fn generate_rejects_reserved_and_duplicate_names() {
        assert!(
            CertificateBundle::generate("ca", &[LeafSpec::new("root-ca", ["x"])]).is_err()
        );
        let dup = [LeafSpec::new("a", ["a"]), LeafSpec::new("a", ["b"])];
        assert!(CertificateBundle::generate("ca", &dup).is_err());
    }

    #[test]
    fn distinguished_name_matches_opensearch_format() {
        let leaf = LeafSpec::new("admin", Vec::<String>::new());
        assert_eq!(leaf.distinguished_name(), "CN=admin,OU=BTPI,O=BTPI-REACT");
    }

    #[tokio::test]
    async fn ensure_bundle_generates_once() {
        let dir = tempfile::tempdir().unwrap();
        let generated = ensure_bundle(dir.path(), "ca", &leaves(), false)
            .await
            .unwrap();
        assert!(generated);
        assert!(bundle_complete(dir.path(), &["wazuh-indexer", "admin"]));

        let first_ca = std::fs::read_to_string(dir.path().join(CA_CERT_FILE)).unwrap();
        let generated = ensure_bundle(dir.path(), "ca", &leaves(), false)
            .await
            .unwrap();
        assert!(!generated);
        let second_ca = std::fs::read_to_string(dir.path().join(CA_CERT_FILE)).unwrap();
        assert_eq!(first_ca, second_ca);
    }

    #[tokio::test]
    async fn ensure_bundle_regenerates_when_file_missing_or_forced() {
        let dir = tempfile::tempdir().unwrap();
        ensure_bundle(dir.path(), "ca", &leaves(), false)
            .await
            .unwrap();
        std::fs::remove_file(dir.path().join("admin-key.pem")).unwrap();
        assert!(
            ensure_bundle(dir.path(), "ca", &leaves(), false)
                .await
                .unwrap()
        );
        assert!(
            ensure_bundle(dir.path(), "ca", &leaves(), true)
                .await
                .unwrap()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn private_keys_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        ensure_bundle(dir.path(), "ca", &leaves(), false)
            .await
            .unwrap();
        let mode = std::fs::metadata(dir.path().join(CA_KEY_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
