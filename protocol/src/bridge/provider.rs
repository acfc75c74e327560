//! # Wallet Providers
//!
//! Phantom, Solflare and Backpack all speak the same protocol with different
//! accents: different hosts, a different name for the wallet's public key
//! parameter, different callback paths, and different opinions on which
//! error codes exist. A [`ProviderProfile`] captures the accent; everything
//! else is shared.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use super::error::RejectionKind;
use crate::config::BridgeConfig;

/// A supported wallet application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletProvider {
    Phantom,
    Solflare,
    Backpack,
}

/// Everything that differs between providers.
#[derive(Debug)]
pub struct ProviderProfile {
    pub display_name: &'static str,
    pub base_url: &'static str,
    /// Query parameter carrying the wallet's X25519 public key in callbacks.
    pub wallet_key_param: &'static str,
    pub connect_path: &'static str,
    pub sign_path: &'static str,
    pub install_url: &'static str,
    /// Compare callback links ignoring ASCII case.
    pub case_insensitive_links: bool,
    /// A missing `nonce` is read as empty instead of rejected outright.
    /// An empty nonce never decrypts, so for these providers the callback
    /// still fails, as a decryption error rather than a malformed one.
    pub nonce_optional: bool,
    /// Error codes with a specific meaning; anything else is `Unknown`.
    pub known_error_codes: &'static [(&'static str, RejectionKind)],
}

const FULL_ERROR_CODES: &[(&str, RejectionKind)] = &[
    ("4001", RejectionKind::UserRejected),
    ("4002", RejectionKind::WalletRejected),
    ("4003", RejectionKind::NetworkRejected),
    ("4004", RejectionKind::InsufficientFunds),
    ("4005", RejectionKind::MalformedTransaction),
];

const PHANTOM: ProviderProfile = ProviderProfile {
    display_name: "Phantom",
    base_url: "https://phantom.app/ul/v1",
    wallet_key_param: "phantom_encryption_public_key",
    connect_path: "onConnect",
    sign_path: "onSignTransaction",
    install_url: "https://apps.apple.com/us/app/phantom-solana-wallet/id1598432977",
    case_insensitive_links: false,
    nonce_optional: false,
    known_error_codes: FULL_ERROR_CODES,
};

const SOLFLARE: ProviderProfile = ProviderProfile {
    display_name: "Solflare",
    base_url: "https://solflare.com/ul/v1",
    wallet_key_param: "solflare_encryption_public_key",
    connect_path: "onSolflareConnect",
    sign_path: "onSolflareSignTransaction",
    install_url: "https://apps.apple.com/app/solflare-wallet/id1580902717",
    case_insensitive_links: true,
    nonce_optional: false,
    known_error_codes: FULL_ERROR_CODES,
};

const BACKPACK: ProviderProfile = ProviderProfile {
    display_name: "Backpack",
    base_url: "https://backpack.app/ul/v1",
    wallet_key_param: "wallet_encryption_public_key",
    connect_path: "onBackpackConnect",
    sign_path: "onBackpackSignTransaction",
    install_url: "https://apps.apple.com/app/backpack-wallet/id1626107061",
    case_insensitive_links: false,
    nonce_optional: true,
    known_error_codes: &[
        ("4001", RejectionKind::UserRejected),
        ("4002", RejectionKind::WalletRejected),
    ],
};

/// Which half of the protocol a callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Connect,
    Sign,
}

impl WalletProvider {
    pub const ALL: [WalletProvider; 3] = [
        WalletProvider::Phantom,
        WalletProvider::Solflare,
        WalletProvider::Backpack,
    ];

    pub fn profile(&self) -> &'static ProviderProfile {
        match self {
            WalletProvider::Phantom => &PHANTOM,
            WalletProvider::Solflare => &SOLFLARE,
            WalletProvider::Backpack => &BACKPACK,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            WalletProvider::Phantom => "phantom",
            WalletProvider::Solflare => "solflare",
            WalletProvider::Backpack => "backpack",
        }
    }

    /// `<scheme>://<path>` the wallet calls back on.
    pub fn redirect_link(&self, config: &BridgeConfig, kind: CallbackKind) -> String {
        let profile = self.profile();
        let path = match kind {
            CallbackKind::Connect => profile.connect_path,
            CallbackKind::Sign => profile.sign_path,
        };
        format!("{}://{}", config.redirect_scheme, path)
    }

    /// Which callback, if any, `link` is. Compares the part before `?`.
    pub fn classify_callback(&self, config: &BridgeConfig, link: &str) -> Option<CallbackKind> {
        let target = link.split('?').next().unwrap_or(link);
        let insensitive = self.profile().case_insensitive_links;
        [CallbackKind::Connect, CallbackKind::Sign]
            .into_iter()
            .find(|kind| {
                let expected = self.redirect_link(config, *kind);
                if insensitive {
                    target.eq_ignore_ascii_case(&expected)
                } else {
                    target == expected
                }
            })
    }

    pub fn connect_url(&self, config: &BridgeConfig, dapp_public_key: &str) -> String {
        self.build_url(
            "connect",
            &[
                ("dapp_encryption_public_key", dapp_public_key),
                ("cluster", config.cluster.as_str()),
                ("app_url", &config.app_url),
                ("redirect_link", &self.redirect_link(config, CallbackKind::Connect)),
            ],
        )
    }

    pub fn sign_url(
        &self,
        config: &BridgeConfig,
        dapp_public_key: &str,
        nonce: &str,
        payload: &str,
    ) -> String {
        self.build_url(
            "signTransaction",
            &[
                ("dapp_encryption_public_key", dapp_public_key),
                ("nonce", nonce),
                ("redirect_link", &self.redirect_link(config, CallbackKind::Sign)),
                ("payload", payload),
            ],
        )
    }

    fn build_url(&self, method: &str, params: &[(&str, &str)]) -> String {
        let base = format!("{}/{}", self.profile().base_url, method);
        match Url::parse_with_params(&base, params) {
            Ok(url) => url.into(),
            // Bases are constants.
            Err(_) => base,
        }
    }

    /// Map a callback's `errorCode` onto the shared taxonomy.
    pub fn rejection_kind(&self, code: &str) -> RejectionKind {
        self.profile()
            .known_error_codes
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, kind)| *kind)
            .unwrap_or(RejectionKind::Unknown)
    }
}

impl fmt::Display for WalletProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for WalletProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WalletProvider::ALL
            .into_iter()
            .find(|p| p.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown wallet provider: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_url_carries_all_params() {
        let config = BridgeConfig::default();
        let url = Url::parse(&WalletProvider::Phantom.connect_url(&config, "DAPPKEY")).unwrap();
        assert_eq!(url.host_str(), Some("phantom.app"));
        assert_eq!(url.path(), "/ul/v1/connect");

        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["dapp_encryption_public_key"], "DAPPKEY");
        assert_eq!(params["cluster"], "devnet");
        assert_eq!(params["app_url"], "https://gocabs.com");
        assert_eq!(params["redirect_link"], "gocabs://onConnect");
    }

    #[test]
    fn test_sign_url_path_per_provider() {
        let config = BridgeConfig::default();
        let url = WalletProvider::Backpack.sign_url(&config, "K", "N", "P");
        assert!(url.starts_with("https://backpack.app/ul/v1/signTransaction?"));
        assert!(url.contains("redirect_link=gocabs%3A%2F%2FonBackpackSignTransaction"));
    }

    #[test]
    fn test_classify_callback() {
        let config = BridgeConfig::default();
        assert_eq!(
            WalletProvider::Phantom.classify_callback(&config, "gocabs://onConnect?data=x"),
            Some(CallbackKind::Connect)
        );
        assert_eq!(
            WalletProvider::Phantom.classify_callback(&config, "gocabs://onSolflareConnect?data=x"),
            None
        );
        // Solflare links survive case mangling; Phantom's don't.
        assert_eq!(
            WalletProvider::Solflare.classify_callback(&config, "GOCABS://onsolflaresigntransaction"),
            Some(CallbackKind::Sign)
        );
        assert_eq!(
            WalletProvider::Phantom.classify_callback(&config, "gocabs://onconnect"),
            None
        );
    }

    #[test]
    fn test_error_code_vocabularies_differ() {
        assert_eq!(
            WalletProvider::Phantom.rejection_kind("4004"),
            RejectionKind::InsufficientFunds
        );
        assert_eq!(
            WalletProvider::Backpack.rejection_kind("4004"),
            RejectionKind::Unknown
        );
        assert_eq!(
            WalletProvider::Solflare.rejection_kind("-32603"),
            RejectionKind::Unknown
        );
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Phantom".parse::<WalletProvider>(), Ok(WalletProvider::Phantom));
        assert!("metamask".parse::<WalletProvider>().is_err());
    }
}
