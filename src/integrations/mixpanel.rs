//! Mixpanel integration. Event data is queried through exposure settings by
//! other services; at this layer Mixpanel only supports connection testing,
//! so the capability flags stay false and the SQL paths report unsupported.

use async_trait::async_trait;

use super::{IntegrationError, WarehouseIntegration};
use crate::models::datasource::{DataSourceType, MixpanelParams};

const ENGAGE_ENDPOINT: &str = "https://mixpanel.com/api/2.0/events/names";

pub struct MixpanelIntegration {
    params: MixpanelParams,
    http: reqwest::Client,
}

impl MixpanelIntegration {
    pub fn new(params: MixpanelParams) -> Self {
        Self {
            params,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WarehouseIntegration for MixpanelIntegration {
    fn datasource_type(&self) -> DataSourceType {
        DataSourceType::Mixpanel
    }

    async fn test_connection(&self) -> Result<(), IntegrationError> {
        let response = self
            .http
            .get(ENGAGE_ENDPOINT)
            .query(&[("type", "general")])
            .basic_auth(&self.params.api_secret, Option::<&str>::None)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(IntegrationError::Connection(format!(
                "Mixpanel API returned {}",
                response.status()
            )))
        }
    }
}
