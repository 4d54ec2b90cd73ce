use crate::devices::{validate_patch, Device, DeviceError, DeviceStore};
use crate::zone::rtdb_url;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Device collection in the Realtime Database, via REST
pub struct RtdbDeviceStore {
    client: reqwest::Client,
    database_url: String,
    path: String,
    auth_token: Option<String>,
}

impl RtdbDeviceStore {
    pub fn new(database_url: &str, path: &str, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            database_url: database_url.to_string(),
            path: path.to_string(),
            auth_token,
        }
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.query(&[("auth", token)]),
            None => req,
        }
    }

    pub(crate) fn device_url(&self, id: &str) -> String {
        let path = format!(
            "{}/{}",
            self.path.trim_matches('/'),
            urlencoding::encode(id)
        );
        rtdb_url(&self.database_url, &path)
    }
}

fn store_error(e: reqwest::Error) -> DeviceError {
    DeviceError::Store(e.to_string())
}

/// Parse the collection body: `null` or `{id: record}`
pub(crate) fn parse_devices(data: &Value) -> Vec<Device> {
    data.as_object()
        .map(|children| {
            children
                .iter()
                .map(|(id, record)| Device::from_record(id, record))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl DeviceStore for RtdbDeviceStore {
    async fn list(&self) -> Result<Vec<Device>, DeviceError> {
        let url = rtdb_url(&self.database_url, &self.path);
        let data: Value = self
            .with_auth(self.client.get(url))
            .send()
            .await
            .map_err(store_error)?
            .error_for_status()
            .map_err(store_error)?
            .json()
            .await
            .map_err(store_error)?;
        Ok(parse_devices(&data))
    }

    async fn update(&self, id: &str, patch: Map<String, Value>) -> Result<(), DeviceError> {
        validate_patch(&patch)?;
        let url = self.device_url(id);

        // PATCH on a missing key would create it
        let existing: Value = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(store_error)?
            .error_for_status()
            .map_err(store_error)?
            .json()
            .await
            .map_err(store_error)?;
        if existing.is_null() {
            return Err(DeviceError::NotFound(id.to_string()));
        }

        self.with_auth(self.client.patch(&url))
            .json(&patch)
            .send()
            .await
            .map_err(store_error)?
            .error_for_status()
            .map_err(store_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_url_encodes_mac() {
        let store = RtdbDeviceStore::new("https://db.example.app", "uwbConfig/devices", None);
        assert_eq!(
            store.device_url("DD:4A:2E:AE:8E:B2"),
            "https://db.example.app/uwbConfig/devices/DD%3A4A%3A2E%3AAE%3A8E%3AB2.json"
        );
    }

    #[test]
    fn test_parse_devices() {
        let devices = parse_devices(&json!({
            "DD:4A": {"coord": "2.0 3.0 7.0", "type": "Anchor", "status": "Online"},
            "U1": {"type": "Tag"}
        }));
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].mac, "DD:4A");
        assert_eq!(devices[1].status, "Offline");

        assert!(parse_devices(&Value::Null).is_empty());
    }
}
