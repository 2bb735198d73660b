use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use secrecy::Secret;

const PASSWORD_BYTES: usize = 32;

/// Random password for a provisioned account: 32 bytes, URL-safe base64.
pub fn generate_password() -> Secret<String> {
    let mut rng = rand::thread_rng();
    let mut bytes = vec![0u8; PASSWORD_BYTES];
    rng.fill(&mut bytes[..]);
    Secret::new(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_password_shape() {
        let password = generate_password();
        let decoded = URL_SAFE_NO_PAD.decode(password.expose_secret()).unwrap();
        assert_eq!(decoded.len(), PASSWORD_BYTES);
        assert_ne!(
            generate_password().expose_secret(),
            password.expose_secret()
        );
    }
}
