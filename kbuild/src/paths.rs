//! Source to object path mapping
//!
//! Objects mirror the source tree under the build root. The object suffix is
//! appended to the full source name rather than replacing its extension, so
//! `kernel.asm` and `kernel.c` land on `kernel.asm.o` and `kernel.c.c.o`.

use std::path::{Path, PathBuf};

/// Suffix for assembler output.
pub const ASM_OBJECT_SUFFIX: &str = ".o";
/// Suffix for compiler output.
pub const C_OBJECT_SUFFIX: &str = ".c.o";

/// Object path for `source` under `build_root`.
pub fn object_path(build_root: &Path, source: &str, suffix: &str) -> PathBuf {
    let mut name = String::with_capacity(source.len() + suffix.len());
    name.push_str(source);
    name.push_str(suffix);
    build_root.join(name)
}

/// Render a path for a command line with `/` separators on every host.
pub fn to_posix(path: &Path) -> String {
    let rendered = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        rendered.into_owned()
    } else {
        rendered.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
