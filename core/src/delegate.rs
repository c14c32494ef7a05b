//! Descriptions of known external delegate plugins.
//!
//! A plugin is a shared library exporting `tflite_plugin_create_delegate`.
//! These helpers only resolve where that library lives; loading happens when
//! an [`Interpreter`](crate::Interpreter) is built.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TfliteError};
use crate::options::DelegateConfig;

/// Operating systems with known plugin library names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    /// Platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
            Self::Other => std::env::consts::OS,
        };
        f.write_str(name)
    }
}

/// An external delegate and the options to start it with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatePlugin {
    /// Display name, e.g. `CoralDelegate`.
    pub name: String,
    /// TFLite version the plugin was built against.
    pub tflite_version: String,
    /// Options passed to the plugin, in order.
    #[serde(default)]
    pub options: Vec<(String, String)>,
    /// Plugin library, if one is available for this host.
    #[serde(default)]
    pub node_path: Option<PathBuf>,
}

impl DelegatePlugin {
    /// Interpreter-level config for this plugin, if it has a library.
    pub fn to_config(&self) -> Option<DelegateConfig> {
        self.node_path.as_ref().map(|path| DelegateConfig {
            path: path.to_string_lossy().into_owned(),
            options: self.options.clone(),
        })
    }
}

/// Coral Edge TPU delegate.
///
/// libedgetpu is installed by the user, so by default the library is looked
/// up by name on the system search path.
pub fn coral_delegate(
    options: Vec<(String, String)>,
    lib_path: Option<PathBuf>,
    platform: Platform,
) -> Result<DelegatePlugin> {
    let path = match lib_path {
        Some(path) => path,
        None => PathBuf::from(match platform {
            Platform::Linux => "libedgetpu.so.1",
            Platform::MacOs => "libedgetpu.1.dylib",
            Platform::Windows => "edgetpu.dll",
            Platform::Other => {
                return Err(TfliteError::config(format!("Unknown platform {}", platform)))
            }
        }),
    };
    Ok(DelegatePlugin {
        name: "CoralDelegate".to_string(),
        tflite_version: "2.7".to_string(),
        options,
        node_path: Some(path),
    })
}

/// WebNN delegate, shipped as a prebuilt library under `base_dir`.
pub fn webnn_delegate(
    options: Vec<(String, String)>,
    lib_path: Option<PathBuf>,
    platform: Platform,
    base_dir: &Path,
) -> Result<DelegatePlugin> {
    let path = match lib_path {
        Some(path) => path,
        None => match platform {
            Platform::Linux => base_dir.join("cc_lib/linux_x64/webnn_external_delegate_obj.so"),
            Platform::Windows => base_dir.join("cc_lib/win32_x64/webnn_external_delegate_obj.dll"),
            Platform::MacOs | Platform::Other => {
                return Err(TfliteError::config(format!("Unknown platform {}", platform)))
            }
        },
    };
    Ok(DelegatePlugin {
        name: "WebNNDelegate".to_string(),
        tflite_version: "2.7".to_string(),
        options,
        node_path: Some(path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coral_library_names() {
        let cases = [
            (Platform::Linux, "libedgetpu.so.1"),
            (Platform::MacOs, "libedgetpu.1.dylib"),
            (Platform::Windows, "edgetpu.dll"),
        ];
        for (platform, name) in cases {
            let plugin = coral_delegate(vec![], None, platform).unwrap();
            assert_eq!(plugin.node_path, Some(PathBuf::from(name)));
            assert_eq!(plugin.name, "CoralDelegate");
        }
        assert!(matches!(
            coral_delegate(vec![], None, Platform::Other),
            Err(TfliteError::Config(_))
        ));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = PathBuf::from("/opt/libedgetpu.so");
        let plugin = coral_delegate(vec![], Some(path), Platform::Other).unwrap();
        assert_eq!(plugin.node_path, Some(PathBuf::from("/opt/libedgetpu.so")));
    }

    #[test]
    fn test_webnn_paths() {
        let base = Path::new("/pkg");
        let plugin = webnn_delegate(vec![], None, Platform::Linux, base).unwrap();
        assert_eq!(
            plugin.node_path,
            Some(PathBuf::from("/pkg/cc_lib/linux_x64/webnn_external_delegate_obj.so"))
        );
        let plugin = webnn_delegate(vec![], None, Platform::Windows, base).unwrap();
        assert_eq!(
            plugin.node_path,
            Some(base.join("cc_lib/win32_x64/webnn_external_delegate_obj.dll"))
        );
        assert!(webnn_delegate(vec![], None, Platform::MacOs, base).is_err());
    }

    #[test]
    fn test_to_config_keeps_options() {
        let options = vec![("device".to_string(), "usb".to_string())];
        let plugin = coral_delegate(options.clone(), None, Platform::Linux).unwrap();
        let config = plugin.to_config().unwrap();
        assert_eq!(config.path, "libedgetpu.so.1");
        assert_eq!(config.options, options);

        let bare = DelegatePlugin {
            node_path: None,
            ..plugin
        };
        assert!(bare.to_config().is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_current_platform_resolves_coral() {
        assert_eq!(Platform::current(), Platform::Linux);
        let plugin = coral_delegate(vec![], None, Platform::current()).unwrap();
        assert_eq!(plugin.node_path, Some(PathBuf::from("libedgetpu.so.1")));
    }
}
