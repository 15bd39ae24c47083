//! 调用方身份校验
//!
//! token 的签发不在网关内，网关只负责校验。[`IdentityVerifier`] 是校验器的接入点，
//! 默认实现 [`StaticTokenVerifier`] 使用配置文件里的静态 token 表。

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use chatgate_core::config::{AuthConfig, TokenEntry};

/// 通过校验的调用方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// 校验 token，无效时返回 `None`
    async fn verify(&self, token: &str) -> Option<CallerIdentity>;
}

/// 静态 token 表
///
/// 只保存 token 的 SHA-256 哈希，比较使用常量时间。
pub struct StaticTokenVerifier {
    entries: Vec<HashedToken>,
}

struct HashedToken {
    hash: [u8; 32],
    user_id: String,
}

impl StaticTokenVerifier {
    pub fn new(tokens: &[TokenEntry]) -> Self {
        let entries = tokens
            .iter()
            .filter(|entry| !entry.token.is_empty())
            .map(|entry| HashedToken {
                hash: hash_token(&entry.token),
                user_id: entry.user_id.clone(),
            })
            .collect::<Vec<_>>();

        if entries.is_empty() {
            tracing::warn!("[AUTH] 未配置任何调用方 token，所有流式请求都会被拒绝");
        }
        Self { entries }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(&auth.tokens)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<CallerIdentity> {
        if token.is_empty() {
            return None;
        }

        let candidate = hash_token(token);
        let mut matched: Option<&HashedToken> = None;
        // 遍历全部条目，不在命中时提前返回
        for entry in &self.entries {
            if bool::from(entry.hash[..].ct_eq(&candidate[..])) {
                matched = Some(entry);
            }
        }

        matched.map(|entry| CallerIdentity {
            user_id: entry.user_id.clone(),
        })
    }
}

fn hash_token(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// token 指纹，用于日志
pub fn token_fingerprint(token: &str) -> String {
    hex::encode(&hash_token(token)[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> StaticTokenVerifier {
        StaticTokenVerifier::new(&[
            TokenEntry {
                user_id: "42".into(),
                token: "student-token".into(),
            },
            TokenEntry {
                user_id: "7".into(),
                token: "admin-token".into(),
            },
        ])
    }

    #[tokio::test]
    async fn test_valid_token_resolves_user() {
        let identity = verifier().verify("admin-token").await;
        assert_eq!(
            identity,
            Some(CallerIdentity {
                user_id: "7".into()
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_and_empty_tokens() {
        let v = verifier();
        assert_eq!(v.verify("nope").await, None);
        assert_eq!(v.verify("").await, None);
        assert_eq!(v.verify("student-token ").await, None);
    }

    #[tokio::test]
    async fn test_empty_table_rejects_everything() {
        let v = StaticTokenVerifier::new(&[]);
        assert!(v.is_empty());
        assert_eq!(v.verify("anything").await, None);
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        assert_eq!(token_fingerprint("abc"), token_fingerprint("abc"));
        assert_eq!(token_fingerprint("abc").len(), 8);
        assert_ne!(token_fingerprint("abc"), token_fingerprint("abd"));
    }
}
