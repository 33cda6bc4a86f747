// ============================================================================
// SETTINGS — persisted key=value configuration
// ============================================================================

use std::path::PathBuf;

use crate::error::{FxError, FxResult};

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// "Auto", "High Performance", or "Low Power".
    pub preferred_gpu: String,
    /// Longer side of the live-preview working resolution.
    pub preview_max_dim: u32,
    pub max_undo_steps: usize,
    /// Seed advance per frame for animated layers (batch and animation).
    pub frame_seed_stride: f32,
    pub export_chunk_size: usize,
    pub animation_fps: u32,
    /// Directory holding `effects.json` and `custom/*.wgsl`.
    pub shaders_dir: PathBuf,
    pub presets_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        let base = config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            preferred_gpu: "Auto".to_string(),
            preview_max_dim: 1024,
            max_undo_steps: 50,
            frame_seed_stride: 1.0,
            export_chunk_size: 8,
            animation_fps: 30,
            shaders_dir: base.join("shaders"),
            presets_dir: base.join("presets"),
        }
    }
}

/// Per-user configuration directory.
/// On Linux:   ~/.config/shaderstack  (XDG_CONFIG_HOME respected)
/// On Windows: %APPDATA%\ShaderStack
/// On macOS:   ~/Library/Application Support/ShaderStack
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let base = std::env::var("XDG_CONFIG_HOME").map(PathBuf::from).ok().or_else(|| {
            std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config"))
        })?;
        return Some(base.join("shaderstack"));
    }
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
        return Some(PathBuf::from(appdata).join("ShaderStack"));
    }
    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").ok()?;
        return Some(PathBuf::from(home).join("Library").join("Application Support").join("ShaderStack"));
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.to_path_buf()))
    }
}

impl Settings {
    pub fn settings_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("shaderstack_settings.cfg"))
    }

    /// Load from the default path; missing or unreadable files give defaults.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Unknown keys are ignored; unparsable values keep their default.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "preferred_gpu" => s.preferred_gpu = val.to_string(),
                "preview_max_dim" => s.preview_max_dim = val.parse().unwrap_or(s.preview_max_dim),
                "max_undo_steps" => s.max_undo_steps = val.parse().unwrap_or(s.max_undo_steps),
                "frame_seed_stride" => {
                    s.frame_seed_stride = val.parse::<f32>().ok().filter(|v| v.is_finite()).unwrap_or(s.frame_seed_stride)
                }
                "export_chunk_size" => {
                    s.export_chunk_size = val.parse().ok().filter(|&n| n > 0).unwrap_or(s.export_chunk_size)
                }
                "animation_fps" => s.animation_fps = val.parse().ok().filter(|&n| n > 0).unwrap_or(s.animation_fps),
                "shaders_dir" if !val.is_empty() => s.shaders_dir = PathBuf::from(val),
                "presets_dir" if !val.is_empty() => s.presets_dir = PathBuf::from(val),
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "preferred_gpu={}\n\
             preview_max_dim={}\n\
             max_undo_steps={}\n\
             frame_seed_stride={}\n\
             export_chunk_size={}\n\
             animation_fps={}\n\
             shaders_dir={}\n\
             presets_dir={}\n",
            self.preferred_gpu,
            self.preview_max_dim,
            self.max_undo_steps,
            self.frame_seed_stride,
            self.export_chunk_size,
            self.animation_fps,
            self.shaders_dir.display(),
            self.presets_dir.display(),
        )
    }

    pub fn save(&self) -> FxResult<()> {
        let path = Self::settings_path().ok_or_else(|| FxError::manifest("no configuration directory"))?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| FxError::io(dir, e))?;
        }
        std::fs::write(&path, self.to_config_string()).map_err(|e| FxError::io(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_known_keys_and_ignores_the_rest() {
        let s = Settings::parse(
            "# comment\npreferred_gpu=Low Power\npreview_max_dim = 512\nanimation_fps=24\nunknown=1\nnot a pair\n",
        );
        assert_eq!(s.preferred_gpu, "Low Power");
        assert_eq!(s.preview_max_dim, 512);
        assert_eq!(s.animation_fps, 24);
        assert_eq!(s.max_undo_steps, 50);
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let s = Settings::parse("max_undo_steps=lots\nexport_chunk_size=0\nframe_seed_stride=NaN\nanimation_fps=-3\n");
        let d = Settings::default();
        assert_eq!(s.max_undo_steps, d.max_undo_steps);
        assert_eq!(s.export_chunk_size, d.export_chunk_size);
        assert_eq!(s.frame_seed_stride, d.frame_seed_stride);
        assert_eq!(s.animation_fps, d.animation_fps);
    }

    #[test]
    fn config_string_parses_back() {
        let s = Settings {
            preferred_gpu: "High Performance".into(),
            preview_max_dim: 2048,
            frame_seed_stride: 0.5,
            shaders_dir: PathBuf::from("/tmp/shaders"),
            ..Settings::default()
        };
        assert_eq!(Settings::parse(&s.to_config_string()), s);
    }
}
