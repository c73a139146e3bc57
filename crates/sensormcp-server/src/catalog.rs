//! The device's fixed resource and tool catalog.
//!
//! Three resources and six tools. Every tool takes an empty object; every
//! payload is a JSON document rendered as text.

use serde::Serialize;
use serde_json::Value;
use sensormcp_core::logging::{info, targets};
use sensormcp_core::{McpError, McpResult};
use sensormcp_device::NetworkStatus;
use sensormcp_protocol::{Content, Resource, ResourceContent, Tool};

use crate::builder::ServerBuilder;
use crate::handler::{BoxFuture, DeviceContext, ResourceHandler, ToolHandler};

/// URI of the device information resource.
pub const DEVICE_INFO_URI: &str = "device://info";
/// URI of the sensor data resource.
pub const SENSOR_DATA_URI: &str = "device://sensor/data";
/// URI of the network status resource.
pub const NETWORK_STATUS_URI: &str = "device://network/status";

const JSON_MIME: &str = "application/json";

/// Battery level below which the battery is reported as low.
const LOW_BATTERY_THRESHOLD: u8 = 20;

/// Registers every resource and tool of the device catalog, in listing order.
pub(crate) fn register(builder: ServerBuilder) -> ServerBuilder {
    builder
        .resource(DeviceInfoResource)
        .resource(SensorDataResource)
        .resource(NetworkStatusResource)
        .tool(GetDeviceInfo)
        .tool(GetSensorData)
        .tool(GetBatteryStatus)
        .tool(GetWifiStatus)
        .tool(GetMqttStatus)
        .tool(RestartSensor)
}

fn pretty<T: Serialize>(value: &T) -> McpResult<String> {
    serde_json::to_string_pretty(value).map_err(McpError::from)
}

fn json_resource<T: Serialize>(uri: &str, value: &T) -> McpResult<Vec<ResourceContent>> {
    Ok(vec![ResourceContent {
        uri: uri.to_string(),
        mime_type: Some(JSON_MIME.to_string()),
        text: Some(pretty(value)?),
    }])
}

fn json_content<T: Serialize>(value: &T) -> McpResult<Vec<Content>> {
    Ok(vec![Content::text(pretty(value)?)])
}

fn resource(uri: &str, name: &str, description: &str) -> Resource {
    Resource {
        uri: uri.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        mime_type: Some(JSON_MIME.to_string()),
    }
}

fn tool(name: &str, description: &str) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {}
        }),
    }
}

// ============================================================================
// Resources
// ============================================================================

struct DeviceInfoResource;

impl ResourceHandler for DeviceInfoResource {
    fn definition(&self) -> Resource {
        resource(
            DEVICE_INFO_URI,
            "Device Information",
            "Identity, firmware, uptime and battery of the sensor device",
        )
    }

    fn read(&self, ctx: &DeviceContext) -> McpResult<Vec<ResourceContent>> {
        json_resource(DEVICE_INFO_URI, &ctx.device().snapshot())
    }
}

struct SensorDataResource;

impl ResourceHandler for SensorDataResource {
    fn definition(&self) -> Resource {
        resource(
            SENSOR_DATA_URI,
            "Sensor Data",
            "Current CO2 reading in ppm",
        )
    }

    fn read(&self, ctx: &DeviceContext) -> McpResult<Vec<ResourceContent>> {
        json_resource(SENSOR_DATA_URI, &ctx.engine().current())
    }

    fn read_async<'a>(
        &'a self,
        ctx: &'a DeviceContext,
    ) -> BoxFuture<'a, McpResult<Vec<ResourceContent>>> {
        Box::pin(async move {
            let reading = ctx.engine().acquire().await;
            json_resource(SENSOR_DATA_URI, &reading)
        })
    }
}

struct NetworkStatusResource;

impl ResourceHandler for NetworkStatusResource {
    fn definition(&self) -> Resource {
        resource(
            NETWORK_STATUS_URI,
            "Network Status",
            "WiFi and MQTT connection status",
        )
    }

    fn read(&self, _ctx: &DeviceContext) -> McpResult<Vec<ResourceContent>> {
        json_resource(NETWORK_STATUS_URI, &NetworkStatus::current())
    }
}

// ============================================================================
// Tools
// ============================================================================

struct GetDeviceInfo;

impl ToolHandler for GetDeviceInfo {
    fn definition(&self) -> Tool {
        tool("get_device_info", "Get device identity, uptime and battery level")
    }

    fn call(&self, ctx: &DeviceContext, _arguments: Value) -> McpResult<Vec<Content>> {
        json_content(&ctx.device().snapshot())
    }
}

struct GetSensorData;

impl ToolHandler for GetSensorData {
    fn definition(&self) -> Tool {
        tool(
            "get_sensor_data",
            "Read the CO2 sensor, falling back to a simulated value if the hardware does not answer",
        )
    }

    fn call(&self, ctx: &DeviceContext, _arguments: Value) -> McpResult<Vec<Content>> {
        json_content(&ctx.engine().current())
    }

    fn call_async<'a>(
        &'a self,
        ctx: &'a DeviceContext,
        _arguments: Value,
    ) -> BoxFuture<'a, McpResult<Vec<Content>>> {
        Box::pin(async move {
            let reading = ctx.engine().acquire().await;
            json_content(&reading)
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatteryStatus {
    battery_level: u8,
    low_battery: bool,
}

struct GetBatteryStatus;

impl ToolHandler for GetBatteryStatus {
    fn definition(&self) -> Tool {
        tool("get_battery_status", "Get the battery level")
    }

    fn call(&self, ctx: &DeviceContext, _arguments: Value) -> McpResult<Vec<Content>> {
        let level = ctx.device().battery_level();
        json_content(&BatteryStatus {
            battery_level: level,
            low_battery: level < LOW_BATTERY_THRESHOLD,
        })
    }
}

struct GetWifiStatus;

impl ToolHandler for GetWifiStatus {
    fn definition(&self) -> Tool {
        tool("get_wifi_status", "Get the WiFi connection status")
    }

    fn call(&self, _ctx: &DeviceContext, _arguments: Value) -> McpResult<Vec<Content>> {
        json_content(&NetworkStatus::current().wifi)
    }
}

struct GetMqttStatus;

impl ToolHandler for GetMqttStatus {
    fn definition(&self) -> Tool {
        tool("get_mqtt_status", "Get the MQTT broker connection status")
    }

    fn call(&self, _ctx: &DeviceContext, _arguments: Value) -> McpResult<Vec<Content>> {
        json_content(&NetworkStatus::current().mqtt)
    }
}

#[derive(Serialize)]
struct RestartAck {
    success: bool,
    message: &'static str,
}

struct RestartSensor;

impl ToolHandler for RestartSensor {
    fn definition(&self) -> Tool {
        tool("restart_sensor", "Restart the sensor")
    }

    fn call(&self, ctx: &DeviceContext, _arguments: Value) -> McpResult<Vec<Content>> {
        info!(target: targets::HANDLER, "Sensor restart requested");
        ctx.activity().record("sensor restart requested");
        json_content(&RestartAck {
            success: true,
            message: "Sensor restart initiated",
        })
    }
}
