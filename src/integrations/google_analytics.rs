//! Google Analytics integration. Carries an OAuth refresh token; the
//! connection test proves the token still grants access. Report queries are
//! generated elsewhere, so the SQL capability flags stay false.

use async_trait::async_trait;

use super::oauth::GoogleOauthClient;
use super::{IntegrationError, WarehouseIntegration};
use crate::models::datasource::{DataSourceType, GoogleAnalyticsParams};

pub struct GoogleAnalyticsIntegration {
    params: GoogleAnalyticsParams,
    oauth: GoogleOauthClient,
}

impl GoogleAnalyticsIntegration {
    pub fn new(params: GoogleAnalyticsParams) -> Self {
        Self {
            params,
            oauth: GoogleOauthClient::new(),
        }
    }
}

#[async_trait]
impl WarehouseIntegration for GoogleAnalyticsIntegration {
    fn datasource_type(&self) -> DataSourceType {
        DataSourceType::GoogleAnalytics
    }

    async fn test_connection(&self) -> Result<(), IntegrationError> {
        if self.params.view_id.is_empty() {
            return Err(IntegrationError::Connection(
                "Google Analytics view id is not set".to_string(),
            ));
        }
        self.oauth
            .access_token(&self.params.refresh_token)
            .await
            .map(|_| ())
    }
}
