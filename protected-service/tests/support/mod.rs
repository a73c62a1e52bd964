use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use httpmock::prelude::*;
use httpmock::Mock;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

pub struct TestIssuer {
    encoding: EncodingKey,
    modulus: String,
    exponent: String,
}

impl TestIssuer {
    pub fn new() -> anyhow::Result<Self> {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048)?;
        let public_key = private_key.to_public_key();
        let private_pem = private_key.to_pkcs1_pem(LineEnding::LF)?;

        Ok(Self {
            encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes())?,
            modulus: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            exponent: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        })
    }

    pub fn jwks(&self, kid: &str) -> Value {
        json!({
            "keys": [
                {
                    "kid": kid,
                    "kty": "RSA",
                    "alg": "RS256",
                    "use": "sig",
                    "n": self.modulus,
                    "e": self.exponent
                }
            ]
        })
    }

    pub fn token(&self, kid: &str, audience: &str, expires_in: i64) -> anyhow::Result<String> {
        let now = Utc::now().timestamp();
        let claims = json!({
            "sub": "kp_0c1d",
            "aud": [audience],
            "iss": "https://tenant.kinde.com",
            "iat": now,
            "exp": now + expires_in,
            "org_code": "org_77",
            "permissions": ["read:reports"],
            "feature_flags": {"theme": "dark"}
        });
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        Ok(encode(&header, &claims, &self.encoding)?)
    }
}

pub async fn serve_jwks<'a>(server: &'a MockServer, status: u16, body: Value) -> Mock<'a> {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/.well-known/jwks");
            then.status(status)
                .header("content-type", "application/json")
                .body(body.to_string());
        })
        .await
}
