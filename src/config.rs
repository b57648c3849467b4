use subtle::ConstantTimeEq;

use crate::errors::AppError;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub port: u16,
    pub max_connections: u32,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| AppError::configuration("DATABASE_URL not set"))?;

        let port = std::env::var("APP_PORT")
            .map(|val| val.parse::<u16>())
            .unwrap_or(Ok(DEFAULT_PORT))
            .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?;

        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .map(|val| val.parse::<u32>())
            .unwrap_or(Ok(DEFAULT_MAX_CONNECTIONS))
            .map_err(|_| AppError::configuration("DB_MAX_CONNECTIONS must be a positive integer"))?;

        if max_connections == 0 {
            return Err(AppError::configuration("DB_MAX_CONNECTIONS must be a positive integer"));
        }

        Ok(Self {
            database_url,
            port,
            max_connections,
        })
    }
}

/// Header carrying the shared secret on billing webhook calls.
pub const BILLING_SECRET_HEADER: &str = "x-billing-secret";

/// Authority for plan writes. Only the billing provider knows the secret;
/// without one configured every webhook call is refused.
#[derive(Debug, Clone, Default)]
pub struct BillingConfig {
    webhook_secret: Option<String>,
}

impl BillingConfig {
    pub fn new(webhook_secret: Option<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("BILLING_WEBHOOK_SECRET").ok())
    }

    pub fn verify(&self, presented: Option<&str>) -> Result<(), AppError> {
        let Some(expected) = self.webhook_secret.as_deref() else {
            return Err(AppError::unauthorized("billing webhook is not configured"));
        };

        match presented {
            Some(presented)
                if presented.len() == expected.len() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) =>
            {
                Ok(())
            }
            _ => Err(AppError::unauthorized("invalid billing secret")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_billing_refuses_everything() {
        let config = BillingConfig::new(Some("   ".to_string()));
        assert!(config.verify(Some("   ")).is_err());
        assert!(BillingConfig::default().verify(None).is_err());
    }

    #[test]
    fn billing_secret_must_match_exactly() {
        let config = BillingConfig::new(Some("whsec_123".to_string()));
        assert!(config.verify(Some("whsec_123")).is_ok());
        assert!(config.verify(Some("whsec_12")).is_err());
        assert!(config.verify(Some("whsec_124")).is_err());
        assert!(config.verify(None).is_err());
    }
}
