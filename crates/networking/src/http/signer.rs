//! HMAC-SHA256 request signing

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Receive window sent with every signed request, in milliseconds
pub(crate) const RECV_WINDOW_MS: u64 = 60_000;

/// Signs canonicalized query strings for the private endpoints.
///
/// The signature is computed over the exact canonical string: parameters
/// sorted by key ascending, joined as `k=v` with `&`, with `timestamp` and
/// `recvWindow` already injected. `signature=<hex>` is appended afterwards
/// and never participates in the sort.
pub(crate) struct Signer {
    secret_key: String,
}

impl Signer {
    pub(crate) fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
        }
    }

    /// Parameters sorted by key and joined as `k=v` pairs with `&`
    pub(crate) fn canonical_query(params: &[(String, String)]) -> String {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Lowercase hex HMAC-SHA256 of the canonical string
    pub(crate) fn signature(&self, canonical: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Full signed query: inject `timestamp` and `recvWindow`, canonicalize,
    /// sign, and append the signature last
    pub(crate) fn signed_query(
        &self,
        mut params: Vec<(String, String)>,
        timestamp_ms: i64,
    ) -> String {
        params.push(("timestamp".to_string(), timestamp_ms.to_string()));
        params.push(("recvWindow".to_string(), RECV_WINDOW_MS.to_string()));
        let canonical = Self::canonical_query(&params);
        let signature = self.signature(&canonical);
        format!("{canonical}&signature={signature}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn canonical_query_sorts_by_key() {
        let q = Signer::canonical_query(&params(&[
            ("symbol", "XRPUSDT"),
            ("quantity", "5"),
            ("side", "BUY"),
        ]));
        assert_eq!(q, "quantity=5&side=BUY&symbol=XRPUSDT");
    }

    #[test]
    fn signature_is_deterministic_for_equal_input() {
        let signer = Signer::new("secret");
        let canonical = "a=1&b=2&timestamp=1700000000000";
        assert_eq!(signer.signature(canonical), signer.signature(canonical));
    }

    #[test]
    fn signature_depends_on_secret_and_payload() {
        let a = Signer::new("secret-a");
        let b = Signer::new("secret-b");
        assert_ne!(a.signature("x=1"), b.signature("x=1"));
        assert_ne!(a.signature("x=1"), a.signature("x=2"));
    }

    #[test]
    fn signed_query_injects_timestamp_and_appends_signature_last() {
        let signer = Signer::new("secret");
        let q = signer.signed_query(params(&[("symbol", "XRPUSDT")]), 1_700_000_000_000);
        assert!(q.starts_with("recvWindow=60000&symbol=XRPUSDT&timestamp=1700000000000&signature="));
        // signature is hex over the pre-signature portion
        let (canonical, sig) = q.rsplit_once("&signature=").unwrap();
        assert_eq!(sig, signer.signature(canonical));
        assert_eq!(sig.len(), 64);
    }

    #[test]
    fn param_order_does_not_change_the_signature() {
        let signer = Signer::new("secret");
        let forward = signer.signed_query(params(&[("a", "1"), ("b", "2")]), 1);
        let reversed = signer.signed_query(params(&[("b", "2"), ("a", "1")]), 1);
        assert_eq!(forward, reversed);
    }
}
