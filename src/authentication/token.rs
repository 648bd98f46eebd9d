use crate::domain::User;
use jsonwebtoken::{
    decode, encode, errors::Error, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub admin: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    keys: Arc<(EncodingKey, DecodingKey)>,
    expiry: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &Secret<String>, expiry_hours: i64) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            keys: Arc::new((
                EncodingKey::from_secret(secret),
                DecodingKey::from_secret(secret),
            )),
            expiry: Duration::hours(expiry_hours),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, Error> {
        self.issue_at(user, OffsetDateTime::now_utc())
    }

    fn issue_at(&self, user: &User, now: OffsetDateTime) -> Result<String, Error> {
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            admin: user.is_admin,
            iat: now.unix_timestamp(),
            exp: (now + self.expiry).unix_timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.keys.0)
    }

    pub fn decode(&self, token: &str) -> Result<Claims, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.keys.1, &validation).map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Address;
    use claims::{assert_err, assert_ok};

    fn user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            email: "jane@example.com".into(),
            password_hash: Secret::new(String::new()),
            full_name: "Jane Doe".into(),
            address: Address::default(),
            is_admin: true,
            role_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(&Secret::new(secret.into()), 24)
    }

    #[test]
    fn issued_tokens_decode_to_the_user_claims() {
        // given
        let user = user();
        let issuer = issuer("a-very-long-signing-secret");

        // when
        let claims = assert_ok!(issuer.decode(&issuer.issue(&user).unwrap()));

        // then
        assert_eq!(claims.sub, user.id);
        assert!(claims.admin);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        // given
        let token = issuer("first-secret").issue(&user()).unwrap();

        // then
        assert_err!(issuer("second-secret").decode(&token));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        // given
        let issuer = issuer("a-very-long-signing-secret");
        let token = issuer
            .issue_at(&user(), OffsetDateTime::now_utc() - Duration::days(2))
            .unwrap();

        // then
        assert_err!(issuer.decode(&token));
    }
}
