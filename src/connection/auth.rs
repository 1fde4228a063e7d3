//! Login handshake.
//!
//! The server answers the initial `login` command with an RSA public key; the
//! password crosses the wire PKCS#1 v1.5 encrypted and base64 encoded. After
//! authentication the session id is read back with `SELECT CURRENT_SESSION`
//! as text, because session ids are 20-digit numbers that lose precision when
//! routed through a JSON double.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::{BigUint, Pkcs1v15Encrypt, RsaPublicKey};
use serde_json::Value;
use tracing::debug;

use crate::connection::config::ConnectConfig;
use crate::error::ConnectionError;
use crate::transport::messages::{
    Attributes, AuthRequest, ExecuteRequest, LoginRequest, PublicKeyInfo, StatementResult,
};
use crate::transport::Channel;

const DRIVER_NAME: &str = concat!("exastream ", env!("CARGO_PKG_VERSION"));

/// Run the full login sequence and return the numeric session id.
pub(crate) async fn login(
    channel: &Channel,
    config: &ConnectConfig,
) -> Result<u64, ConnectionError> {
    let key_info: PublicKeyInfo = channel
        .send(&LoginRequest::new())
        .await
        .map_err(|e| ConnectionError::AuthenticationFailed(e.to_string()))?;

    let encrypted = encrypt_password(&config.password, &key_info)?;

    let auth = AuthRequest {
        username: config.username.clone(),
        password: encrypted,
        use_compression: false,
        client_name: config.client_name.clone(),
        driver_name: Some(DRIVER_NAME.to_string()),
        client_os: Some(std::env::consts::OS.to_string()),
        client_os_username: std::env::var("USER").ok(),
        attributes: Attributes {
            autocommit: Some(true),
            ..Attributes::default()
        },
    };

    // The auth payload carries session details we deliberately ignore; the
    // session id field arrives as a JSON number and cannot be trusted.
    let _: Value = channel
        .send(&auth)
        .await
        .map_err(|e| ConnectionError::AuthenticationFailed(e.to_string()))?;

    let session_id = query_session_id(channel).await?;
    debug!(session_id, "session established");
    Ok(session_id)
}

/// RSA-encrypt the password with the server's key, base64 standard alphabet.
fn encrypt_password(password: &str, key: &PublicKeyInfo) -> Result<String, ConnectionError> {
    let modulus = hex::decode(&key.public_key_modulus)
        .map_err(|e| ConnectionError::AuthenticationFailed(format!("Bad key modulus: {}", e)))?;
    let exponent = hex::decode(&key.public_key_exponent)
        .map_err(|e| ConnectionError::AuthenticationFailed(format!("Bad key exponent: {}", e)))?;

    let public_key = RsaPublicKey::new(
        BigUint::from_bytes_be(&modulus),
        BigUint::from_bytes_be(&exponent),
    )
    .map_err(|e| ConnectionError::AuthenticationFailed(format!("Invalid public key: {}", e)))?;

    let mut rng = rand::thread_rng();
    let ciphertext = public_key
        .encrypt(&mut rng, Pkcs1v15Encrypt, password.as_bytes())
        .map_err(|e| {
            ConnectionError::AuthenticationFailed(format!("Password encryption failed: {}", e))
        })?;

    Ok(BASE64.encode(ciphertext))
}

async fn query_session_id(channel: &Channel) -> Result<u64, ConnectionError> {
    let result: StatementResult = channel
        .send(&ExecuteRequest::new("SELECT CURRENT_SESSION"))
        .await
        .map_err(|e| ConnectionError::AuthenticationFailed(e.to_string()))?;

    let scalar = result
        .results
        .first()
        .and_then(|r| r.result_set.as_ref())
        .and_then(|rs| rs.data.as_ref())
        .and_then(|cols| cols.first())
        .and_then(|col| col.first())
        .ok_or_else(|| {
            ConnectionError::AuthenticationFailed("CURRENT_SESSION returned no data".to_string())
        })?;

    let text = match scalar {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.parse().map_err(|e| {
        ConnectionError::AuthenticationFailed(format!("Bad session id '{}': {}", text, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::channel::tests::scripted_channel;

    fn test_config() -> ConnectConfig {
        ConnectConfig::builder()
            .host("localhost")
            .username("sys")
            .password("exasol")
            .build()
            .unwrap()
    }

    // A small but real RSA-512 key so PKCS#1 v1.5 encryption succeeds.
    const TEST_MODULUS: &str = "d0941a6ba1c73e2afb5448e0d4bfa78b18df567ab41e252db1aa461ea4a01ff5b1c722c4b7a2ae0cfd9b6d97b0d98c94b8202ab7cbc52b26ee66ec2e1766b357";
    const TEST_EXPONENT: &str = "010001";

    #[test]
    fn test_encrypt_password_is_base64() {
        let key = PublicKeyInfo {
            public_key_modulus: TEST_MODULUS.to_string(),
            public_key_exponent: TEST_EXPONENT.to_string(),
        };
        let encoded = encrypt_password("secret", &key).unwrap();
        let raw = BASE64.decode(encoded).unwrap();
        // RSA-512: ciphertext is exactly the modulus size
        assert_eq!(raw.len(), 64);
    }

    #[test]
    fn test_encrypt_password_rejects_bad_hex() {
        let key = PublicKeyInfo {
            public_key_modulus: "zz".to_string(),
            public_key_exponent: TEST_EXPONENT.to_string(),
        };
        let err = encrypt_password("secret", &key).unwrap_err();
        assert!(matches!(err, ConnectionError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_login_sequence_parses_session_id_from_text() {
        let key_response = format!(
            r#"{{"status": "ok", "responseData": {{"publicKeyModulus": "{}", "publicKeyExponent": "{}"}}}}"#,
            TEST_MODULUS, TEST_EXPONENT
        );
        let channel = scripted_channel(vec![
            &key_response,
            r#"{"status": "ok", "responseData": {"sessionId": 1234}}"#,
            // 20-digit session id arrives as text and survives intact
            r#"{"status": "ok", "responseData": {"numResults": 1, "results": [{"resultType": "resultSet", "resultSet": {"numRows": 1, "numRowsInMessage": 1, "columns": [{"name": "CURRENT_SESSION", "dataType": {"type": "DECIMAL"}}], "data": [["17592186044416123456"]]}}]}}"#,
        ]);

        let session_id = login(&channel, &test_config()).await.unwrap();
        assert_eq!(session_id, 17592186044416123456);
    }

    #[tokio::test]
    async fn test_login_failure_maps_to_auth_error() {
        let channel = scripted_channel(vec![
            r#"{"status": "error", "exception": {"text": "access denied", "sqlCode": "08004"}}"#,
        ]);

        let err = login(&channel, &test_config()).await.unwrap_err();
        match err {
            ConnectionError::AuthenticationFailed(msg) => assert!(msg.contains("access denied")),
            other => panic!("expected AuthenticationFailed, got {:?}", other),
        }
    }
}
