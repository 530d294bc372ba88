//! 环境配置。
//!
//! 引擎本身几乎没有什么可调的东西——缓冲区大小，以及起步时携带哪些额外的
//! 解析器/逃生通道——所以相较于线上格式和调度逻辑，这个模块刻意保持很小。
//! 文件加载遵循本 corpus 其余部分惯用的 `serde` + `toml`/`serde_json` 套路，
//! 置于 `config-file` feature 之后。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VesperError};
use crate::registry::Resolver;

/// [`EngineConfig`] 中可序列化的子集：能够来自一份 TOML/JSON 文件的全部内容。
/// 解析器与 SERIALIZABLE 逃生通道是纯运行时概念（闭包与 trait object），
/// 只能通过 [`EngineConfig::with_resolvers`] / [`EngineConfig::with_serializable_codec`]
/// 以编程方式附加。
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// 引擎分配的缓冲区可以增长到的最大字节数。
    pub max_frame_size: usize,
    /// 引擎分配新缓冲区时预留的初始容量。
    pub initial_buffer_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            initial_buffer_capacity: 256,
        }
    }
}

/// 借助显式注入的不透明编解码器解码一段长度前缀的 SERIALIZABLE 载荷
/// （Design Notes 选项 (a)）；保持未设置则相当于禁用该逃生通道
/// （选项 (b)，也是默认行为）。
pub trait OpaqueSerializableCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn std::any::Any + Send>>;
}

/// [`crate::engine::Engine`] 的完整运行时配置。
#[derive(Clone)]
pub struct EngineConfig {
    pub settings: EngineSettings,
    pub(crate) resolvers: Vec<Resolver>,
    pub(crate) serializable_codec: Option<Arc<dyn OpaqueSerializableCodec>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settings: EngineSettings::default(),
            resolvers: Vec::new(),
            serializable_codec: None,
        }
    }
}

impl EngineConfig {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            resolvers: Vec::new(),
            serializable_codec: None,
        }
    }

    /// 追加在两个内置默认解析器之后应用的解析器。
    pub fn with_resolvers(mut self, resolvers: Vec<Resolver>) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// 安装支撑 SERIALIZABLE 逃生通道的不透明编解码器。
    pub fn with_serializable_codec(mut self, codec: Arc<dyn OpaqueSerializableCodec>) -> Self {
        self.serializable_codec = Some(codec);
        self
    }

    pub fn max_frame_size(&self) -> usize {
        self.settings.max_frame_size
    }

    pub fn initial_buffer_capacity(&self) -> usize {
        self.settings.initial_buffer_capacity
    }

    #[cfg(feature = "config-file")]
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: EngineSettings = toml::from_str(text)
            .map_err(|e| VesperError::configuration(format!("invalid TOML config: {e}")))?;
        tracing::debug!(max_frame_size = settings.max_frame_size, "loaded engine config from TOML");
        Ok(Self::new(settings))
    }

    #[cfg(feature = "config-file")]
    pub fn from_json_str(text: &str) -> Result<Self> {
        let settings: EngineSettings = serde_json::from_str(text)
            .map_err(|e| VesperError::configuration(format!("invalid JSON config: {e}")))?;
        tracing::debug!(max_frame_size = settings.max_frame_size, "loaded engine config from JSON");
        Ok(Self::new(settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert!(config.max_frame_size() > 0);
        assert!(config.serializable_codec.is_none());
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn parses_toml_settings() {
        let config = EngineConfig::from_toml_str("max_frame_size = 4096\ninitial_buffer_capacity = 64\n").unwrap();
        assert_eq!(config.max_frame_size(), 4096);
        assert_eq!(config.initial_buffer_capacity(), 64);
    }
}
