use std::sync::OnceLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

use crate::keys::SigningKey;

pub(crate) struct KeyMaterial {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub modulus: String,
    pub exponent: String,
}

impl KeyMaterial {
    pub fn generate() -> Self {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("private pem");
        let public_pem = public_key.to_pkcs1_pem(LineEnding::LF).expect("public pem");

        Self {
            encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("encoding key"),
            decoding: DecodingKey::from_rsa_pem(public_pem.as_bytes()).expect("decoding key"),
            modulus: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            exponent: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }

    /// RSA generation is slow; most tests can share one key pair.
    pub fn shared() -> &'static Self {
        static SHARED: OnceLock<KeyMaterial> = OnceLock::new();
        SHARED.get_or_init(Self::generate)
    }

    /// A second, unrelated key pair.
    pub fn other() -> &'static Self {
        static OTHER: OnceLock<KeyMaterial> = OnceLock::new();
        OTHER.get_or_init(Self::generate)
    }

    pub fn jwk(&self, kid: &str) -> Value {
        json!({
            "kid": kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": self.modulus,
            "e": self.exponent
        })
    }

    pub fn signing_key(&self, kid: &str) -> SigningKey {
        SigningKey::new(kid, Some(Algorithm::RS256), self.decoding.clone())
    }

    pub fn sign(&self, kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_owned);
        encode(&header, claims, &self.encoding).expect("sign token")
    }
}

pub(crate) fn claims_for(audience: &str, expires_in: i64) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "sub": "kp_2a7f",
        "aud": audience,
        "iss": "https://tenant.kinde.com",
        "iat": now,
        "exp": now + expires_in,
        "permissions": ["read:reports"],
        "org_code": "org_51"
    })
}
