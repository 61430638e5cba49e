//! `.env` 시크릿 파일 관리
//!
//! 서비스 비밀번호와 API 키를 `KEY=value` 형식의 `.env` 파일로 보관합니다.
//! 시크릿은 OS CSPRNG로 생성하며, 이미 존재하는 키는 `rotate`를 지정하지
//! 않는 한 절대 덮어쓰지 않습니다. 재실행해도 이미 배포된 서비스의 자격 증명이
//! 바뀌지 않아야 하기 때문입니다.

use std::path::Path;

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::error::{BtpiError, SecretError};

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
/// Wazuh API가 허용하는 특수문자 집합
const SYMBOLS: &[u8] = b".*+?-";

/// 비밀번호 최소 길이 (문자 클래스 4종을 모두 담을 수 있어야 함)
const MIN_PASSWORD_LENGTH: usize = 8;

/// 순서를 보존하는 `.env` 파일 표현
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    entries: Vec<(String, String)>,
}

impl EnvFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// `.env` 텍스트를 파싱합니다.
    ///
    /// 빈 줄과 `#` 주석은 무시하고, `export ` 접두어와 값의 양쪽 따옴표는 제거합니다.
    /// 같은 키가 여러 번 나오면 마지막 값이 이깁니다.
    pub fn parse(content: &str) -> Result<Self, SecretError> {
        let mut env = Self::new();
        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=').ok_or_else(|| SecretError::InvalidLine {
                line: idx + 1,
                reason: "expected KEY=value".to_owned(),
            })?;
            let key = key.trim();
            if !is_valid_key(key) {
                return Err(SecretError::InvalidLine {
                    line: idx + 1,
                    reason: format!("invalid key '{key}'"),
                });
            }
            env.insert_unchecked(key, unquote(value.trim()));
        }
        Ok(env)
    }

    /// 파일에서 로드합니다. 파일이 없으면 빈 `EnvFile`을 반환합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BtpiError> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Self::parse(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "env file does not exist yet");
                Ok(Self::new())
            }
            Err(e) => Err(BtpiError::Io(e)),
        }
    }

    /// 파일로 저장합니다 (unix에서는 0600 권한).
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), BtpiError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, self.render()).await?;
        restrict_permissions(path).await?;
        info!(path = %path.display(), keys = self.len(), "env file written");
        Ok(())
    }

    /// `.env` 텍스트로 렌더링합니다.
    pub fn render(&self) -> String {
        let mut out = String::from("# Generated by btpi. Do not commit this file.\n");
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 값이 반드시 있어야 하는 키를 조회합니다.
    pub fn require(&self, key: &str) -> Result<&str, SecretError> {
        self.get(key)
            .ok_or_else(|| SecretError::Missing(key.to_owned()))
    }

    /// 키를 설정합니다. 기존 키는 위치를 유지한 채 값만 바뀝니다.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), SecretError> {
        if !is_valid_key(key) {
            return Err(SecretError::InvalidKey(key.to_owned()));
        }
        self.insert_unchecked(key, value.into());
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert_unchecked(&mut self, key: &str, value: String) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_owned(), value)),
        }
    }
}

/// 시크릿 생성 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    /// 대문자/소문자/숫자/특수문자를 각각 하나 이상 포함하는 비밀번호
    Password { length: usize },
    /// 랜덤 바이트의 16진수 표현
    Hex { bytes: usize },
    /// 영숫자 토큰
    Alphanumeric { length: usize },
}

/// 생성할 시크릿 정의
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretSpec {
    pub key: &'static str,
    pub kind: SecretKind,
}

impl SecretSpec {
    pub const fn password(key: &'static str) -> Self {
        Self {
            key,
            kind: SecretKind::Password { length: 24 },
        }
    }

    pub const fn hex(key: &'static str, bytes: usize) -> Self {
        Self {
            key,
            kind: SecretKind::Hex { bytes },
        }
    }

    pub const fn token(key: &'static str, length: usize) -> Self {
        Self {
            key,
            kind: SecretKind::Alphanumeric { length },
        }
    }

    /// 새 시크릿 값을 생성합니다.
    pub fn generate(&self) -> String {
        match self.kind {
            SecretKind::Password { length } => generate_password(length),
            SecretKind::Hex { bytes } => generate_hex(bytes),
            SecretKind::Alphanumeric { length } => OsRng
                .sample_iter(&Alphanumeric)
                .take(length)
                .map(char::from)
                .collect(),
        }
    }
}

/// 누락된 시크릿을 채웁니다.
///
/// 이미 있는 키는 `rotate`가 `true`일 때만 새로 생성합니다.
/// 새로 쓴 키 목록을 반환합니다.
pub fn ensure_secrets(env: &mut EnvFile, specs: &[SecretSpec], rotate: bool) -> Vec<String> {
    let mut written = Vec::new();
    for spec in specs {
        if env.contains(spec.key) && !rotate {
            continue;
        }
        env.insert_unchecked(spec.key, spec.generate());
        written.push(spec.key.to_owned());
    }
    if !written.is_empty() {
        info!(count = written.len(), rotate, "generated secrets");
    }
    written
}

/// 출력용 마스킹: 앞 2글자만 남기고 나머지는 `*`로 바꿉니다.
pub fn mask(value: &str) -> String {
    let visible: String = value.chars().take(2).collect();
    let hidden = value.chars().count().saturating_sub(2);
    format!("{visible}{}", "*".repeat(hidden))
}

fn generate_password(length: usize) -> String {
    let length = length.max(MIN_PASSWORD_LENGTH);
    let mut rng = OsRng;
    let classes = [UPPER, LOWER, DIGITS, SYMBOLS];
    let all: Vec<u8> = classes.concat();

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    while chars.len() < length {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

fn generate_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill(buf.as_mut_slice());
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        value[1..value.len() - 1].to_owned()
    } else {
        value.to_owned()
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let env = EnvFile::parse(
            "# header\n\nWAZUH_API_PASSWORD=abc\nexport KASM_ADMIN_PASSWORD=\"quoted value\"\n",
        )
        .unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("WAZUH_API_PASSWORD"), Some("abc"));
        assert_eq!(env.get("KASM_ADMIN_PASSWORD"), Some("quoted value"));
    }

    #[test]
    fn parse_keeps_equals_signs_in_values() {
        let env = EnvFile::parse("TOKEN=a=b==\n").unwrap();
        assert_eq!(env.get("TOKEN"), Some("a=b=="));
    }

    #[test]
    fn parse_rejects_line_without_equals() {
        let err = EnvFile::parse("OK=1\nbroken line\n").unwrap_err();
        match err {
            SecretError::InvalidLine { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_rejects_invalid_key() {
        assert!(EnvFile::parse("1ABC=x\n").is_err());
        assert!(EnvFile::parse("MY-KEY=x\n").is_err());
    }

    #[test]
    fn duplicate_key_last_wins_and_keeps_position() {
        let env = EnvFile::parse("A=1\nB=2\nA=3\n").unwrap();
        let keys: Vec<_> = env.keys().collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(env.get("A"), Some("3"));
    }

    #[test]
    fn render_then_parse_preserves_entries() {
        let mut env = EnvFile::new();
        env.set("FIRST", "1").unwrap();
        env.set("SECOND", "two").unwrap();
        let reparsed = EnvFile::parse(&env.render()).unwrap();
        assert_eq!(reparsed, env);
    }

    #[test]
    fn set_rejects_invalid_key() {
        let mut env = EnvFile::new();
        assert!(matches!(
            env.set("bad key", "x"),
            Err(SecretError::InvalidKey(_))
        ));
    }

    #[test]
    fn require_reports_missing_key() {
        let env = EnvFile::new();
        let err = env.require("MISP_ADMIN_PASSPHRASE").unwrap_err();
        assert!(err.to_string().contains("MISP_ADMIN_PASSPHRASE"));
    }

    #[test]
    fn password_contains_every_character_class() {
        for _ in 0..50 {
            let pw = SecretSpec::password("X").generate();
            assert_eq!(pw.len(), 24);
            assert!(pw.bytes().any(|b| UPPER.contains(&b)));
            assert!(pw.bytes().any(|b| LOWER.contains(&b)));
            assert!(pw.bytes().any(|b| DIGITS.contains(&b)));
            assert!(pw.bytes().any(|b| SYMBOLS.contains(&b)));
        }
    }

    #[test]
    fn short_password_is_raised_to_minimum() {
        let spec = SecretSpec {
            key: "X",
            kind: SecretKind::Password { length: 2 },
        };
        assert_eq!(spec.generate().len(), MIN_PASSWORD_LENGTH);
    }

    #[test]
    fn hex_secret_has_expected_length() {
        let value = SecretSpec::hex("X", 16).generate();
        assert_eq!(value.len(), 32);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn token_is_alphanumeric() {
        let value = SecretSpec::token("X", 40).generate();
        assert_eq!(value.len(), 40);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn ensure_secrets_fills_only_missing_keys() {
        let mut env = EnvFile::parse("EXISTING=keep-me\n").unwrap();
        let specs = [
            SecretSpec::password("EXISTING"),
            SecretSpec::hex("NEW_SECRET", 8),
        ];
        let written = ensure_secrets(&mut env, &specs, false);
        assert_eq!(written, vec!["NEW_SECRET".to_owned()]);
        assert_eq!(env.get("EXISTING"), Some("keep-me"));
        assert!(env.contains("NEW_SECRET"));
    }

    #[test]
    fn ensure_secrets_rotate_replaces_existing() {
        let mut env = EnvFile::parse("EXISTING=keep-me\n").unwrap();
        let written = ensure_secrets(&mut env, &[SecretSpec::password("EXISTING")], true);
        assert_eq!(written.len(), 1);
        assert_ne!(env.get("EXISTING"), Some("keep-me"));
    }

    #[test]
    fn mask_keeps_two_leading_chars() {
        assert_eq!(mask("secret"), "se****");
        assert_eq!(mask("a"), "a");
        assert_eq!(mask(""), "");
    }

    #[tokio::test]
    async fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvFile::load(dir.path().join("absent.env")).await.unwrap();
        assert!(env.is_empty());
    }

    #[tokio::test]
    async fn save_creates_parent_dirs_and_restricts_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(".env");
        let mut env = EnvFile::new();
        env.set("WAZUH_API_PASSWORD", "p4ss").unwrap();
        env.save(&path).await.unwrap();

        let loaded = EnvFile::load(&path).await.unwrap();
        assert_eq!(loaded.get("WAZUH_API_PASSWORD"), Some("p4ss"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
