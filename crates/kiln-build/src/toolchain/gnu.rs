//! GCC and Clang drivers

use super::{quote, Command, CompileRequest, LinkKind, LinkRequest, Toolchain};
use crate::depfile::DependencyFormat;
use crate::features::Features;
use crate::targets::SourceKind;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GnuFamily {
    Gcc,
    Clang,
}

/// GNU-style driver: `-MD -MF` dependency rules, `-include` precompiled headers
#[derive(Debug, Clone)]
pub struct GnuToolchain {
    family: GnuFamily,
    cc: String,
    cxx: String,
    title: String,
}

impl GnuToolchain {
    pub fn new(family: GnuFamily, cc: impl Into<String>, version: Option<String>) -> Self {
        let cc = cc.into();
        let cxx = cxx_driver(&cc);
        let name = match family {
            GnuFamily::Gcc => "GCC",
            GnuFamily::Clang => "Clang",
        };
        let title = match version {
            Some(version) => format!("{} {}", name, version),
            None => name.to_string(),
        };

        Self {
            family,
            cc,
            cxx,
            title,
        }
    }

    fn driver(&self, kind: SourceKind) -> &str {
        match kind {
            SourceKind::Cxx => &self.cxx,
            _ => &self.cc,
        }
    }

    fn push_compile_flags(&self, buf: &mut String, request: &CompileRequest<'_>) {
        match request.kind {
            SourceKind::Cxx => buf.push_str(" -std=gnu++17"),
            _ => buf.push_str(" -std=gnu11"),
        }
        for definition in request.definitions {
            let _ = write!(buf, " -D{}", definition);
        }
        for dir in request.include_directories {
            let _ = write!(buf, " -I{}", quote(dir));
        }

        let features = request.features;
        if features.contains(Features::OPTIMIZE) {
            if features.contains(Features::MINIMIZE_SIZE) {
                buf.push_str(" -Os");
            } else {
                buf.push_str(" -O2 -DNDEBUG");
            }
        } else {
            buf.push_str(" -O0");
        }
        if features.contains(Features::DEBUG_INFO) {
            buf.push_str(" -g");
        }
        if features.contains(Features::WARNINGS) {
            buf.push_str(" -Wall -Wextra");
        } else {
            buf.push_str(" -w");
        }
        if features.contains(Features::LTO) {
            buf.push_str(" -flto");
        }
        push_sanitizers(buf, features);
        if !cfg!(windows) {
            buf.push_str(" -fPIC");
        }
        if let Some(flags) = request.flags {
            let _ = write!(buf, " {}", flags);
        }
    }
}

impl Toolchain for GnuToolchain {
    fn name(&self) -> &str {
        match self.family {
            GnuFamily::Gcc => "gcc",
            GnuFamily::Clang => "clang",
        }
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
            | Features::TSAN
            | Features::UBSAN
    }

    fn object_extension(&self) -> &str {
        ".o"
    }

    fn link_extension(&self, kind: LinkKind) -> &str {
        match kind {
            LinkKind::Executable if cfg!(windows) => ".exe",
            LinkKind::Executable => "",
            LinkKind::SharedLibrary if cfg!(windows) => ".dll",
            LinkKind::SharedLibrary if cfg!(target_os = "macos") => ".dylib",
            LinkKind::SharedLibrary => ".so",
        }
    }

    fn pch_cache(&self, stub: &Path) -> PathBuf {
        let ext = match self.family {
            GnuFamily::Gcc => "gch",
            GnuFamily::Clang => "pch",
        };
        append_extension(stub, ext)
    }

    fn make_pch_command(&self, request: &CompileRequest<'_>) -> Command {
        let language = match request.kind {
            SourceKind::Cxx => "c++-header",
            _ => "c-header",
        };
        let cache = self.pch_cache(request.source);
        let deps = append_extension(&cache, "d");

        let mut buf = format!("\"{}\" -x {} {}", self.driver(request.kind), language, quote(request.source));
        self.push_compile_flags(&mut buf, request);
        let _ = write!(buf, " -o {}", quote(&cache));

        let mut cmd = Command::new(buf);
        let _ = write!(cmd.cmd_line, " -MD -MF {}", quote(&deps));
        cmd.with_deps(DependencyFormat::Make, Some(deps))
    }

    fn make_object_command(&self, request: &CompileRequest<'_>) -> Command {
        let deps = append_extension(request.output, "d");

        let mut buf = format!("\"{}\" -c {}", self.driver(request.kind), quote(request.source));
        if let Some(pch) = request.pch {
            let _ = write!(buf, " -include {}", quote(pch));
        }
        self.push_compile_flags(&mut buf, request);
        let _ = write!(buf, " -o {}", quote(request.output));

        let mut cmd = Command::new(buf);
        let _ = write!(cmd.cmd_line, " -MD -MF {}", quote(&deps));
        cmd.with_deps(DependencyFormat::Make, Some(deps))
    }

    fn make_link_command(&self, request: &LinkRequest<'_>) -> Command {
        let mut buf = format!("\"{}\"", self.cxx);
        let rsp_offset = buf.len();

        if request.kind == LinkKind::SharedLibrary {
            buf.push_str(" -shared");
        }
        let _ = write!(buf, " -o {}", quote(request.output));
        for object in request.objects {
            let _ = write!(buf, " {}", quote(object));
        }
        for library in request.libraries {
            let _ = write!(buf, " -l{}", library);
        }

        let features = request.features;
        if features.contains(Features::LTO) {
            buf.push_str(" -flto");
        }
        if features.contains(Features::DEBUG_INFO) {
            buf.push_str(" -g");
        }
        if features.contains(Features::STATIC_RUNTIME) {
            buf.push_str(" -static-libgcc -static-libstdc++");
        }
        push_sanitizers(&mut buf, features);
        if let Some(flags) = request.flags {
            let _ = write!(buf, " {}", flags);
        }

        let mut cmd = Command::new(buf);
        cmd.rsp_offset = Some(rsp_offset);
        cmd
    }

    fn make_resource_command(&self, script: &Path, output: &Path) -> Option<Command> {
        if !cfg!(windows) {
            return None;
        }
        Some(Command::new(format!(
            "\"{}\" -O coff -i {} -o {}",
            windres_driver(&self.cc),
            quote(script),
            quote(output)
        )))
    }
}

fn push_sanitizers(buf: &mut String, features: Features) {
    if features.contains(Features::ASAN) {
        buf.push_str(" -fsanitize=address");
    }
    if features.contains(Features::TSAN) {
        buf.push_str(" -fsanitize=thread");
    }
    if features.contains(Features::UBSAN) {
        buf.push_str(" -fsanitize=undefined");
    }
}

/// `gcc` -> `g++`, `clang-17` -> `clang++-17`, `cc` -> `c++`
fn cxx_driver(cc: &str) -> String {
    let (dir, name) = match cc.rfind(['/', '\\']) {
        Some(idx) => cc.split_at(idx + 1),
        None => ("", cc),
    };
    let name = if let Some(rest) = name.strip_suffix("gcc") {
        format!("{}g++", rest)
    } else if let Some(rest) = name.strip_prefix("clang") {
        format!("clang++{}", rest)
    } else if name == "cc" {
        "c++".to_string()
    } else if let Some(rest) = name.strip_prefix("gcc") {
        format!("g++{}", rest)
    } else {
        name.to_string()
    };
    format!("{}{}", dir, name)
}

/// `x86_64-w64-mingw32-gcc` -> `x86_64-w64-mingw32-windres`
fn windres_driver(cc: &str) -> String {
    let name = cc.rsplit(['/', '\\']).next().unwrap_or(cc);
    match name.strip_suffix("gcc") {
        Some(prefix) if prefix.ends_with('-') => format!("{}windres", prefix),
        _ => "windres".to_string(),
    }
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(output: &'a Path, pch: Option<&'a Path>, defs: &'a [String]) -> CompileRequest<'a> {
        CompileRequest {
            source: Path::new("src/app.c"),
            kind: SourceKind::C,
            pch,
            definitions: defs,
            include_directories: &[],
            flags: None,
            features: Features::WARNINGS,
            output,
        }
    }

    #[test]
    fn test_cxx_driver_names() {
        assert_eq!(cxx_driver("gcc"), "g++");
        assert_eq!(cxx_driver("/usr/bin/x86_64-linux-gnu-gcc"), "/usr/bin/x86_64-linux-gnu-g++");
        assert_eq!(cxx_driver("clang-17"), "clang++-17");
        assert_eq!(cxx_driver("cc"), "c++");
        assert_eq!(cxx_driver("gcc-13"), "g++-13");
    }

    #[test]
    fn test_windres_driver_keeps_cross_prefix() {
        assert_eq!(windres_driver("x86_64-w64-mingw32-gcc"), "x86_64-w64-mingw32-windres");
        assert_eq!(windres_driver("C:\\mingw\\bin\\gcc"), "windres");
        assert_eq!(windres_driver("gcc-13"), "windres");
        assert_eq!(windres_driver("clang-17"), "windres");
    }

    #[test]
    fn test_resources_only_on_windows() {
        let gcc = GnuToolchain::new(GnuFamily::Gcc, "gcc", None);
        let cmd = gcc.make_resource_command(Path::new("app.rc"), Path::new("app.res"));
        assert_eq!(cmd.is_some(), cfg!(windows));
    }

    #[test]
    fn test_object_command_cache_key_excludes_depfile() {
        let gcc = GnuToolchain::new(GnuFamily::Gcc, "gcc", None);
        let defs = vec!["FEATURE_X".to_string()];
        let cmd = gcc.make_object_command(&request(Path::new("bin/app.c.o"), None, &defs));

        assert!(cmd.cache_key().contains("-DFEATURE_X"));
        assert!(cmd.cache_key().ends_with("-o \"bin/app.c.o\""));
        assert!(!cmd.cache_key().contains("-MF"));
        assert_eq!(cmd.deps_format, DependencyFormat::Make);
        assert_eq!(cmd.deps_path, Some(PathBuf::from("bin/app.c.o.d")));
    }

    #[test]
    fn test_pch_cache_extension_per_family() {
        let stub = Path::new("bin/pch.h");
        let gcc = GnuToolchain::new(GnuFamily::Gcc, "gcc", None);
        let clang = GnuToolchain::new(GnuFamily::Clang, "clang", Some("16.0.6".into()));

        assert_eq!(gcc.pch_cache(stub), PathBuf::from("bin/pch.h.gch"));
        assert_eq!(clang.pch_cache(stub), PathBuf::from("bin/pch.h.pch"));
        assert_eq!(clang.title(), "Clang 16.0.6");
    }

    #[test]
    fn test_link_command_declares_response_offset() {
        let gcc = GnuToolchain::new(GnuFamily::Gcc, "gcc", None);
        let objects = vec![PathBuf::from("a.o"), PathBuf::from("b.o")];
        let libraries = vec!["m".to_string()];
        let cmd = gcc.make_link_command(&LinkRequest {
            objects: &objects,
            libraries: &libraries,
            kind: LinkKind::Executable,
            flags: None,
            features: Features::empty(),
            output: Path::new("bin/app"),
        });

        assert_eq!(cmd.rsp_offset, Some("\"g++\"".len()));
        assert!(cmd.cmd_line.starts_with("\"g++\" -o \"bin/app\" \"a.o\" \"b.o\" -lm"));
    }
}
