pub mod sim;
pub mod value;

use std::sync::Arc;

use value::Value;

use crate::error::LinkamError;

/// Remote instrument reachable through attribute and command RPC.
///
/// Every call may fail or stall; implementations report transport problems as
/// plain errors and the typed helpers below wrap them into
/// [`LinkamError::Communication`].
#[async_trait::async_trait]
pub trait DeviceProxy: Send + Sync {
    fn name(&self) -> &str;

    async fn read_attribute(&self, name: &str) -> anyhow::Result<Value>;
    async fn write_attribute(&self, name: &str, value: Value) -> anyhow::Result<()>;
    async fn command_inout(&self, name: &str, args: Vec<Value>) -> anyhow::Result<Value>;

    async fn read(&self, name: &str) -> anyhow::Result<Value> {
        self.read_attribute(name)
            .await
            .map_err(|e| LinkamError::communication(format!("read {}", name), e).into())
    }

    async fn read_f64(&self, name: &str) -> anyhow::Result<f64> {
        let value = self.read(name).await?;
        value.as_f64().ok_or_else(|| unexpected(name, "number", &value))
    }

    async fn read_i64(&self, name: &str) -> anyhow::Result<i64> {
        let value = self.read(name).await?;
        value.as_i64().ok_or_else(|| unexpected(name, "integer", &value))
    }

    async fn read_bool(&self, name: &str) -> anyhow::Result<bool> {
        let value = self.read(name).await?;
        value.as_bool().ok_or_else(|| unexpected(name, "bool", &value))
    }

    async fn read_flags(&self, name: &str) -> anyhow::Result<Vec<bool>> {
        let value = self.read(name).await?;
        value
            .as_flags()
            .ok_or_else(|| unexpected(name, "flag array", &value))
    }

    async fn read_string(&self, name: &str) -> anyhow::Result<String> {
        let value = self.read(name).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| unexpected(name, "string", &value))
    }

    async fn write(&self, name: &str, value: Value) -> anyhow::Result<()> {
        self.write_attribute(name, value)
            .await
            .map_err(|e| LinkamError::communication(format!("write {}", name), e).into())
    }

    async fn command(&self, name: &str, args: Vec<Value>) -> anyhow::Result<Value> {
        self.command_inout(name, args)
            .await
            .map_err(|e| LinkamError::communication(format!("command {}", name), e).into())
    }
}

#[async_trait::async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, device_name: &str) -> anyhow::Result<Arc<dyn DeviceProxy>>;
}

fn unexpected(name: &str, expected: &'static str, found: &Value) -> anyhow::Error {
    LinkamError::UnexpectedValue {
        attribute: name.to_string(),
        expected,
        found: found.kind().to_string(),
    }
    .into()
}
