//! MSVC (`cl` / `clang-cl`) driver

use super::{quote, Command, CompileRequest, LinkKind, LinkRequest, Toolchain};
use crate::depfile::DependencyFormat;
use crate::features::Features;
use crate::targets::SourceKind;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// MSVC-style driver: `/showIncludes` transcripts, `/Yc` + `/Yu` headers
#[derive(Debug, Clone)]
pub struct MsvcToolchain {
    cl: String,
    linker: String,
    title: String,
}

impl MsvcToolchain {
    pub fn new(cl: impl Into<String>) -> Self {
        let cl = cl.into();
        let clang = cl.to_ascii_lowercase().contains("clang-cl");
        let linker = if clang { "lld-link" } else { "link" }.to_string();
        let title = if clang { "Clang-CL" } else { "MSVC" }.to_string();

        Self { cl, linker, title }
    }

    fn push_compile_flags(&self, buf: &mut String, request: &CompileRequest<'_>) {
        buf.push_str(match request.kind {
            SourceKind::Cxx => " /TP /std:c++17 /EHsc",
            _ => " /TC",
        });
        for definition in request.definitions {
            let _ = write!(buf, " /D{}", definition);
        }
        for dir in request.include_directories {
            let _ = write!(buf, " /I{}", quote(dir));
        }

        let features = request.features;
        if features.contains(Features::OPTIMIZE) {
            buf.push_str(if features.contains(Features::MINIMIZE_SIZE) {
                " /O1"
            } else {
                " /O2 /DNDEBUG"
            });
        } else {
            buf.push_str(" /Od");
        }
        if features.contains(Features::DEBUG_INFO) {
            buf.push_str(" /Z7");
        }
        buf.push_str(if features.contains(Features::WARNINGS) {
            " /W4"
        } else {
            " /w"
        });
        if features.contains(Features::LTO) {
            buf.push_str(" /GL");
        }
        if features.contains(Features::ASAN) {
            buf.push_str(" /fsanitize=address");
        }
        buf.push_str(if features.contains(Features::STATIC_RUNTIME) {
            " /MT"
        } else {
            " /MD"
        });
        if let Some(flags) = request.flags {
            let _ = write!(buf, " {}", flags);
        }
    }

    fn finish_compile(mut cmd: Command) -> Command {
        cmd.cmd_line.push_str(" /showIncludes");
        // cl echoes the name of the source file first
        cmd.skip_lines = 1;
        cmd.with_deps(DependencyFormat::ShowIncludes, None)
    }
}

impl Toolchain for MsvcToolchain {
    fn name(&self) -> &str {
        "msvc"
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn supported_features(&self) -> Features {
        Features::OPTIMIZE
            | Features::MINIMIZE_SIZE
            | Features::DEBUG_INFO
            | Features::WARNINGS
            | Features::PCH
            | Features::LTO
            | Features::STATIC_RUNTIME
            | Features::LINK_LIBRARY
            | Features::HOT_ASSETS
            | Features::ASAN
    }

    fn object_extension(&self) -> &str {
        ".obj"
    }

    fn link_extension(&self, kind: LinkKind) -> &str {
        match kind {
            LinkKind::Executable => ".exe",
            LinkKind::SharedLibrary => ".dll",
        }
    }

    fn pch_cache(&self, stub: &Path) -> PathBuf {
        stub.with_extension("pch")
    }

    fn pch_object(&self, stub: &Path) -> Option<PathBuf> {
        Some(stub.with_extension("obj"))
    }

    fn make_pch_command(&self, request: &CompileRequest<'_>) -> Command {
        let cache = self.pch_cache(request.source);
        let object = stub_object(request.source);

        let mut buf = format!(
            "\"{}\" /nologo /c {} /Yc{} /Fp{} /Fo{}",
            self.cl,
            quote(request.source),
            quote(request.source),
            quote(&cache),
            quote(&object)
        );
        self.push_compile_flags(&mut buf, request);

        Self::finish_compile(Command::new(buf))
    }

    fn make_object_command(&self, request: &CompileRequest<'_>) -> Command {
        let mut buf = format!(
            "\"{}\" /nologo /c {} /Fo{}",
            self.cl,
            quote(request.source),
            quote(request.output)
        );
        if let Some(pch) = request.pch {
            let _ = write!(
                buf,
                " /FI{} /Yu{} /Fp{}",
                quote(pch),
                quote(pch),
                quote(&self.pch_cache(pch))
            );
        }
        self.push_compile_flags(&mut buf, request);

        Self::finish_compile(Command::new(buf))
    }

    fn make_link_command(&self, request: &LinkRequest<'_>) -> Command {
        let mut buf = format!("\"{}\"", self.linker);
        let rsp_offset = buf.len();

        buf.push_str(" /nologo");
        if request.kind == LinkKind::SharedLibrary {
            buf.push_str(" /DLL");
        }
        let _ = write!(buf, " /OUT:{}", quote(request.output));
        for object in request.objects {
            let _ = write!(buf, " {}", quote(object));
        }
        for library in request.libraries {
            let _ = write!(buf, " {}.lib", library);
        }
        if request.features.contains(Features::LTO) {
            buf.push_str(" /LTCG");
        }
        if request.features.contains(Features::DEBUG_INFO) {
            buf.push_str(" /DEBUG");
        }
        if let Some(flags) = request.flags {
            let _ = write!(buf, " {}", flags);
        }

        let mut cmd = Command::new(buf);
        cmd.rsp_offset = Some(rsp_offset);
        cmd
    }

    fn make_resource_command(&self, script: &Path, output: &Path) -> Option<Command> {
        Some(Command::new(format!(
            "rc /nologo /fo{} {}",
            quote(output),
            quote(script)
        )))
    }
}

fn stub_object(stub: &Path) -> PathBuf {
    stub.with_extension("obj")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_command_uses_show_includes() {
        let msvc = MsvcToolchain::new("cl");
        let cmd = msvc.make_object_command(&CompileRequest {
            source: Path::new("src\\app.c"),
            kind: SourceKind::C,
            pch: Some(Path::new("bin\\pch.h")),
            definitions: &["FEATURE_X".to_string()],
            include_directories: &[],
            flags: None,
            features: Features::OPTIMIZE,
            output: Path::new("bin\\app.c.obj"),
        });

        assert_eq!(cmd.deps_format, DependencyFormat::ShowIncludes);
        assert_eq!(cmd.skip_lines, 1);
        assert!(cmd.cache_key().contains("/DFEATURE_X"));
        assert!(cmd.cache_key().contains("/Yu"));
        assert!(!cmd.cache_key().contains("/showIncludes"));
    }

    #[test]
    fn test_icon_resource_command() {
        let msvc = MsvcToolchain::new("cl");
        let cmd = msvc
            .make_resource_command(Path::new("bin\\app.rc"), Path::new("bin\\app.res"))
            .unwrap();
        assert_eq!(cmd.cmd_line, "rc /nologo /fo\"bin\\app.res\" \"bin\\app.rc\"");
    }

    #[test]
    fn test_pch_produces_object_to_link() {
        let msvc = MsvcToolchain::new("clang-cl");
        let stub = Path::new("bin/pch.h");
        assert_eq!(msvc.pch_object(stub), Some(PathBuf::from("bin/pch.obj")));
        assert_eq!(msvc.title(), "Clang-CL");
    }
}
