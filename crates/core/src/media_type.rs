//! Artifact media types for packaged binaries.
//!
//! The layer media type tells a registry (or anything browsing it) what kind
//! of executable a blob holds without downloading it.

/// WebAssembly module.
pub const WASM: &str = "application/vnd.bincast.wasm.v1";
/// Windows PE executable.
pub const WINDOWS_EXE: &str = "application/vnd.bincast.windows.exe.v1";
/// Mach-O executable.
pub const MACHO: &str = "application/vnd.bincast.macho.v1";
/// ELF executable.
pub const ELF: &str = "application/vnd.bincast.elf.v1";
/// Plan 9 a.out executable.
pub const PLAN9: &str = "application/vnd.bincast.plan9.v1";
/// AIX XCOFF executable.
pub const XCOFF: &str = "application/vnd.bincast.xcoff.v1";
/// Anything else.
pub const BINARY: &str = "application/vnd.bincast.binary.v1";

const WASM_HOSTS: &[&str] = &["js", "wasip1", "wasip2", "wasi"];

const ELF_KERNELS: &[&str] = &[
    "linux",
    "freebsd",
    "openbsd",
    "netbsd",
    "dragonfly",
    "solaris",
    "illumos",
];

/// Media type for a binary built for `os`/`arch`.
#[must_use]
pub fn media_type_for(os: &str, arch: &str) -> &'static str {
    if arch == "wasm" || WASM_HOSTS.contains(&os) {
        return WASM;
    }

    match os {
        "windows" => WINDOWS_EXE,
        "darwin" => MACHO,
        "plan9" => PLAN9,
        "aix" => XCOFF,
        os if ELF_KERNELS.contains(&os) => ELF,
        _ => BINARY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wasm_wins_over_os() {
        assert_eq!(media_type_for("js", "wasm"), WASM);
        assert_eq!(media_type_for("wasip1", "wasm"), WASM);
        assert_eq!(media_type_for("linux", "wasm"), WASM);
        assert_eq!(media_type_for("wasip1", "amd64"), WASM);
    }

    #[test]
    fn test_native_formats() {
        assert_eq!(media_type_for("windows", "amd64"), WINDOWS_EXE);
        assert_eq!(media_type_for("darwin", "arm64"), MACHO);
        assert_eq!(media_type_for("plan9", "386"), PLAN9);
        assert_eq!(media_type_for("aix", "ppc64"), XCOFF);
    }

    #[test]
    fn test_unix_kernels_are_elf() {
        for os in ELF_KERNELS {
            assert_eq!(media_type_for(os, "amd64"), ELF, "{os}");
        }
    }

    #[test]
    fn test_unknown_os_is_generic() {
        assert_eq!(media_type_for("haiku", "amd64"), BINARY);
        assert_eq!(media_type_for("", ""), BINARY);
    }
}
