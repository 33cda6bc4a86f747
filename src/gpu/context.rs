// ============================================================================
// GPU CONTEXT — headless device + queue, adapter choice, loss tracking
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{EngineError, EngineResult};

/// The `preferred_gpu` setting, parsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterPreference {
    Auto,
    HighPerformance,
    LowPower,
}

impl AdapterPreference {
    /// Case-insensitive; anything unrecognised means `Auto`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "high performance" | "high-performance" | "discrete" => Self::HighPerformance,
            "low power" | "low-power" | "integrated" => Self::LowPower,
            _ => Self::Auto,
        }
    }

    fn power(self) -> wgpu::PowerPreference {
        match self {
            Self::LowPower => wgpu::PowerPreference::LowPower,
            Self::Auto | Self::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// Device, queue, and the flag every engine call checks before touching them.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    /// Largest 2D texture side the device accepts.
    pub max_texture_dim: u32,
    lost: Arc<AtomicBool>,
}

impl GpuContext {
    /// Hardware adapter first, software rasterizer second.
    pub fn new(preferred_gpu: &str) -> EngineResult<Self> {
        let preference = AdapterPreference::parse(preferred_gpu);
        for software in [false, true] {
            match pollster::block_on(Self::open(preference, software)) {
                Some(ctx) => return Ok(ctx),
                None if !software => tracing::warn!(?preference, "no hardware adapter, trying software fallback"),
                None => {}
            }
        }
        Err(EngineError::Unavailable(format!("no adapter or device for preference {:?}", preference)))
    }

    async fn open(preference: AdapterPreference, software: bool) -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: preference.power(),
                compatible_surface: None,
                force_fallback_adapter: software,
            })
            .await?;

        let info = adapter.get_info();
        let max_texture_dim = adapter.limits().max_texture_dimension_2d;
        let descriptor = wgpu::DeviceDescriptor {
            label: Some("shaderstack_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits { max_texture_dimension_2d: max_texture_dim, ..wgpu::Limits::downlevel_defaults() },
        };
        let (device, queue) = match adapter.request_device(&descriptor, None).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(adapter = %info.name, "device request failed: {e}");
                return None;
            }
        };

        let lost = Arc::new(AtomicBool::new(false));
        let on_lost = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            tracing::error!(?reason, "GPU device lost: {message}");
            on_lost.store(true, Ordering::SeqCst);
        });
        let on_error = lost.clone();
        device.on_uncaptured_error(Box::new(move |err| {
            tracing::error!("uncaptured GPU error: {err}");
            on_error.store(true, Ordering::SeqCst);
        }));

        tracing::info!(adapter = %info.name, backend = ?info.backend, software, max_texture_dim, "GPU context ready");
        Some(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name: info.name,
            max_texture_dim,
            lost,
        })
    }

    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        width.max(height) <= self.max_texture_dim
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// `DeviceLost` once the device is gone; the engine stays unusable.
    pub fn check_alive(&self) -> EngineResult<()> {
        if self.is_lost() {
            return Err(EngineError::DeviceLost(format!("adapter '{}'", self.adapter_name)));
        }
        Ok(())
    }

    pub fn submit_one(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit([encoder.finish()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_names() {
        assert_eq!(AdapterPreference::parse("Auto"), AdapterPreference::Auto);
        assert_eq!(AdapterPreference::parse("High Performance"), AdapterPreference::HighPerformance);
        assert_eq!(AdapterPreference::parse(" low power "), AdapterPreference::LowPower);
        assert_eq!(AdapterPreference::parse("whatever"), AdapterPreference::Auto);
    }
}
