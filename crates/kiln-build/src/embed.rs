//! Asset embedding: turns a list of files into a C source exposing their bytes
//!
//! The generated file defines a table of `{ name, data, len }` records named
//! `KilnAssets` (unless `--no-array`) and one symbol per asset derived from
//! its name (unless `--no-symbols`). Every blob is NUL-terminated so text
//! assets can be used as C strings.

use crate::error::{BuildError, BuildResult};
use crate::fs::atomic_write;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const CODE_PREFIX: &str = r#"// This file is auto-generated by kiln

#include <stddef.h>

#if defined(EXPORT)
    #if defined(_WIN32)
        #define EXPORT_SYMBOL __declspec(dllexport)
    #else
        #define EXPORT_SYMBOL __attribute__((visibility("default")))
    #endif
#else
    #define EXPORT_SYMBOL
#endif
#if defined(__cplusplus)
    #define EXTERN extern "C"
#else
    #define EXTERN extern
#endif

typedef struct KilnAsset {
    const char *name;
    const unsigned char *data;
    size_t len;
} KilnAsset;
"#;

/// Options accepted in a target's `asset_options`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedOptions {
    pub array: bool,
    pub symbols: bool,
    /// Prefix removed from asset names
    pub strip_prefix: Option<String>,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            array: true,
            symbols: true,
            strip_prefix: None,
        }
    }
}

impl EmbedOptions {
    /// Parse `--no-array`, `--no-symbols` and `--strip <prefix>`
    pub fn parse(options: Option<&str>) -> BuildResult<Self> {
        let mut parsed = Self::default();
        let mut words = options.unwrap_or("").split_whitespace();

        while let Some(word) = words.next() {
            match word {
                "--no-array" => parsed.array = false,
                "--no-symbols" => parsed.symbols = false,
                "-s" | "--strip" => {
                    let prefix = words.next().ok_or_else(|| {
                        BuildError::invalid_target(format!("Asset option '{}' needs a value", word))
                    })?;
                    parsed.strip_prefix = Some(prefix.to_string());
                }
                other => {
                    if let Some(prefix) = other.strip_prefix("--strip=") {
                        parsed.strip_prefix = Some(prefix.to_string());
                    } else {
                        return Err(BuildError::invalid_target(format!(
                            "Unknown asset option '{}'",
                            other
                        )));
                    }
                }
            }
        }

        Ok(parsed)
    }

    /// Canonical spelling, stable across runs, used as the cache key
    pub fn to_key(&self) -> String {
        let mut key = String::new();
        if !self.array {
            key.push_str(" --no-array");
        }
        if !self.symbols {
            key.push_str(" --no-symbols");
        }
        if let Some(prefix) = &self.strip_prefix {
            let _ = write!(key, " --strip={}", prefix);
        }
        key
    }

    fn asset_name(&self, path: &Path) -> String {
        let name = path.to_string_lossy().replace('\\', "/");
        match &self.strip_prefix {
            Some(prefix) => name
                .strip_prefix(prefix.as_str())
                .map(|rest| rest.trim_start_matches('/').to_string())
                .unwrap_or(name),
            None => name,
        }
    }
}

/// Generate the C source embedding `assets` into `output`
pub fn write_embed_source(assets: &[PathBuf], options: &EmbedOptions, output: &Path) -> BuildResult<()> {
    let mut code = String::from(CODE_PREFIX);
    let mut blobs = Vec::with_capacity(assets.len());

    if !assets.is_empty() {
        code.push_str("\nstatic const unsigned char raw_data[] = {\n");

        for path in assets {
            let bytes = std::fs::read(path).map_err(|e| BuildError::io(path, e))?;
            let name = options.asset_name(path);

            let _ = writeln!(code, "    // {}", name);
            for chunk in bytes.chunks(16) {
                code.push_str("    ");
                for byte in chunk {
                    let _ = write!(code, "0x{:02X},", byte);
                }
                code.push('\n');
            }
            code.push_str("    0x00,\n");

            blobs.push((name, bytes.len()));
        }

        code.push_str("};\n");
    }

    if options.array {
        code.push_str("\nEXPORT_SYMBOL EXTERN const KilnAsset KilnAssets[];\n");
        code.push_str("EXPORT_SYMBOL EXTERN const size_t KilnAssetCount;\n");
        if blobs.is_empty() {
            code.push_str("const KilnAsset KilnAssets[1] = { { 0, 0, 0 } };\n");
        } else {
            let _ = writeln!(code, "const KilnAsset KilnAssets[{}] = {{", blobs.len());
            let mut offset = 0;
            for (name, len) in &blobs {
                let _ = writeln!(
                    code,
                    "    {{ \"{}\", raw_data + {}, {} }},",
                    escape_c(name),
                    offset,
                    len
                );
                offset += len + 1;
            }
            code.push_str("};\n");
        }
        let _ = writeln!(code, "const size_t KilnAssetCount = {};", blobs.len());
    }

    if options.symbols && !blobs.is_empty() {
        code.push('\n');
        let mut offset = 0;
        for (name, len) in &blobs {
            let var = variable_name(name);
            let _ = writeln!(code, "EXPORT_SYMBOL EXTERN const KilnAsset {};", var);
            let _ = writeln!(
                code,
                "const KilnAsset {} = {{ \"{}\", raw_data + {}, {} }};",
                var,
                escape_c(name),
                offset,
                len
            );
            offset += len + 1;
        }
    }

    atomic_write(output, code.as_bytes())
}

/// `web/app.min.js` -> `WebAppMinJs`, prefixed with `_` when needed
fn variable_name(name: &str) -> String {
    let mut var = String::with_capacity(name.len() + 1);
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        var.push('_');
    }

    let mut upper = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            var.push(if upper { c.to_ascii_uppercase() } else { c });
            upper = false;
        } else {
            upper = true;
        }
    }
    var
}

fn escape_c(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let options = EmbedOptions::parse(Some("--no-symbols --strip assets")).unwrap();
        assert!(options.array);
        assert!(!options.symbols);
        assert_eq!(options.strip_prefix.as_deref(), Some("assets"));
        assert_eq!(options.to_key(), " --no-symbols --strip=assets");

        assert!(EmbedOptions::parse(Some("--compress")).is_err());
        assert!(EmbedOptions::parse(Some("-s")).is_err());
    }

    #[test]
    fn test_variable_names() {
        assert_eq!(variable_name("web/app.min.js"), "WebAppMinJs");
        assert_eq!(variable_name("3d/cube.obj"), "_3dCubeObj");
    }

    #[test]
    fn test_generated_source_lists_assets() {
        let dir = tempfile::tempdir().unwrap();
        let asset = dir.path().join("assets").join("hello.txt");
        std::fs::create_dir_all(asset.parent().unwrap()).unwrap();
        std::fs::write(&asset, "hi").unwrap();
        let output = dir.path().join("Misc").join("app_embed.c");

        let options = EmbedOptions {
            strip_prefix: Some(dir.path().join("assets").to_string_lossy().replace('\\', "/")),
            ..EmbedOptions::default()
        };
        write_embed_source(&[asset], &options, &output).unwrap();

        let code = std::fs::read_to_string(&output).unwrap();
        assert!(code.contains("0x68,0x69,"));
        assert!(code.contains("{ \"hello.txt\", raw_data + 0, 2 },"));
        assert!(code.contains("const KilnAsset HelloTxt = "));
        assert!(code.contains("const size_t KilnAssetCount = 1;"));
    }

    #[test]
    fn test_missing_asset_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_embed_source(
            &[dir.path().join("nope.png")],
            &EmbedOptions::default(),
            &dir.path().join("out.c"),
        );
        assert!(matches!(result, Err(BuildError::IoError { .. })));
    }
}
