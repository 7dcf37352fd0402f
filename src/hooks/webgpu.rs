//! WebGPU 能力探测

use crate::config::PowerPreference;
use crate::render::wgpu_backend::BackendKind;
use serde::{Deserialize, Serialize};

/// 适配器能力
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebGpuCapabilities {
    pub is_supported: bool,
    /// 适配器名称
    pub adapter: Option<String>,
    /// 是否能创建设备
    pub device: bool,
    pub compute_shaders: bool,
    pub features: Vec<String>,
    pub max_texture_dimension_2d: u32,
    pub max_storage_buffer_binding_size: u32,
    pub max_compute_workgroups_per_dimension: u32,
    pub error: Option<String>,
}

impl WebGpuCapabilities {
    fn unsupported(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// 请求 WebGPU 适配器与设备并报告能力
///
/// 任何失败都记录在返回值里，不会返回错误或 panic。
pub async fn probe_webgpu(power_preference: PowerPreference) -> WebGpuCapabilities {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: BackendKind::WebGpu.backends(),
        ..Default::default()
    });
    let Some(adapter) = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: power_preference.into(),
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
    else {
        tracing::warn!(target: "chronos::hooks", "no WebGPU adapter found");
        return WebGpuCapabilities::unsupported("no WebGPU adapter found");
    };

    let info = adapter.get_info();
    let limits = adapter.limits();
    let compute = adapter
        .get_downlevel_capabilities()
        .flags
        .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);
    let mut capabilities = WebGpuCapabilities {
        is_supported: compute,
        adapter: Some(info.name),
        compute_shaders: compute,
        features: adapter
            .features()
            .iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect(),
        max_texture_dimension_2d: limits.max_texture_dimension_2d,
        max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size,
        max_compute_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
        ..WebGpuCapabilities::default()
    };

    match adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Chronos Probe"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(limits),
            },
            None,
        )
        .await
    {
        Ok((device, _queue)) => {
            capabilities.device = true;
            device.destroy();
        }
        Err(error) => {
            tracing::warn!(target: "chronos::hooks", %error, "WebGPU device request failed");
            capabilities.is_supported = false;
            capabilities.error = Some(error.to_string());
        }
    }
    if !compute && capabilities.error.is_none() {
        capabilities.error = Some("compute shaders not supported".to_string());
    }
    tracing::info!(
        target: "chronos::hooks",
        supported = capabilities.is_supported,
        adapter = ?capabilities.adapter,
        "WebGPU probe finished"
    );
    capabilities
}

/// 探测状态
///
/// 宿主在探测开始前创建，结束后调用 [`finish`](Self::finish)。
#[derive(Debug, Clone, PartialEq)]
pub struct WebGpuProbe {
    capabilities: Option<WebGpuCapabilities>,
}

impl Default for WebGpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl WebGpuProbe {
    pub fn new() -> Self {
        Self { capabilities: None }
    }

    /// 执行探测并保存结果
    pub async fn run(&mut self, power_preference: PowerPreference) -> &WebGpuCapabilities {
        let capabilities = probe_webgpu(power_preference).await;
        self.finish(capabilities)
    }

    pub fn finish(&mut self, capabilities: WebGpuCapabilities) -> &WebGpuCapabilities {
        self.capabilities.insert(capabilities)
    }

    pub fn is_loading(&self) -> bool {
        self.capabilities.is_none()
    }

    pub fn is_supported(&self) -> bool {
        self.capabilities.as_ref().is_some_and(|c| c.is_supported)
    }

    pub fn error(&self) -> Option<&str> {
        self.capabilities.as_ref().and_then(|c| c.error.as_deref())
    }

    pub fn capabilities(&self) -> Option<&WebGpuCapabilities> {
        self.capabilities.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_state() {
        let mut probe = WebGpuProbe::new();
        assert!(probe.is_loading());
        assert!(!probe.is_supported());
        assert_eq!(probe.error(), None);

        probe.finish(WebGpuCapabilities::unsupported("no WebGPU adapter found"));
        assert!(!probe.is_loading());
        assert!(!probe.is_supported());
        assert_eq!(probe.error(), Some("no WebGPU adapter found"));
    }
}
