//! Build configuration
//!
//! Tool names, flag strings and the kernel's source lists, resolved once at
//! startup. Each setting comes from, in order of precedence, an explicit
//! override (command line), an environment variable, or a built-in default.

use std::path::PathBuf;

/// Assembly sources, linked first, in this order.
pub const ASM_SOURCES: &[&str] = &[
    "kernel.asm",
    "idt_load.asm",
    "interrupt/isr32.asm",
    "interrupt/isr33.asm",
    "interrupt/isr_stubs.asm",
    "interrupt/isr80.asm",
];

/// C sources, linked after the assembly objects, in this order.
pub const C_SOURCES: &[&str] = &[
    "kernel.c",
    "vga/vga.c",
    "keyboard/keyboard.c",
    "portio/portio.c",
    "time/timer.c",
    "idt.c",
    "pic.c",
    "syscall/syscall.c",
    "time/clock/clock.c",
    "time/clock/rtc.c",
    "malloc/malloc.c",
    "libc/string.c",
    "libc/stack_protector.c",
    "power/poweroff.c",
    "power/reboot.c",
    "multitask/multitask.c",
    "tasks/tasks.c",
    "tasks/exec_inplace.c",
    "ramdisk/ramdisk.c",
    "fat16/fs.c",
    "malloc/user_malloc.c",
];

pub const DEFAULT_BUILD_DIR: &str = "build";
pub const KERNEL_IMAGE_NAME: &str = "kernel";

/// Executables for each tool role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub assembler: String,
    pub compiler: String,
    pub linker: String,
    pub emulator: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            assembler: "nasm".to_string(),
            compiler: "gcc".to_string(),
            linker: "ld".to_string(),
            emulator: "qemu-system-i386".to_string(),
        }
    }
}

impl ToolConfig {
    /// All four tools, in the order the presence check reports them.
    pub fn all(&self) -> [&str; 4] {
        [
            self.compiler.as_str(),
            self.linker.as_str(),
            self.assembler.as_str(),
            self.emulator.as_str(),
        ]
    }
}

/// Raw flag strings; tokenized only when a command is composed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagConfig {
    pub base_cflags: String,
    pub debug_cflags: String,
    pub ldflags: String,
    pub asmflags: String,
    pub extra_cflags: String,
    pub emulator_opts: String,
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            base_cflags: "-m32".to_string(),
            debug_cflags: "-g -O0".to_string(),
            ldflags: "-m elf_i386 -T link.ld".to_string(),
            asmflags: "-f elf32".to_string(),
            extra_cflags: String::new(),
            emulator_opts: String::new(),
        }
    }
}

/// Explicit overrides, typically from the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub assembler: Option<String>,
    pub compiler: Option<String>,
    pub linker: Option<String>,
    pub emulator: Option<String>,
    pub base_cflags: Option<String>,
    pub debug_cflags: Option<String>,
    pub ldflags: Option<String>,
    pub asmflags: Option<String>,
    pub extra_cflags: Option<String>,
    pub emulator_opts: Option<String>,
}

/// Complete, immutable configuration for one invocation
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub tools: ToolConfig,
    pub flags: FlagConfig,
    /// Build root, relative to the project root.
    pub build_dir: PathBuf,
    pub asm_sources: Vec<String>,
    pub c_sources: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tools: ToolConfig::default(),
            flags: FlagConfig::default(),
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            asm_sources: ASM_SOURCES.iter().map(|s| s.to_string()).collect(),
            c_sources: C_SOURCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BuildConfig {
    /// Resolve against the process environment.
    pub fn from_env(overrides: ConfigOverrides) -> Self {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve every setting: override, then `lookup(VAR)`, then default.
    pub fn resolve<F>(overrides: ConfigOverrides, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = BuildConfig::default();
        let pick = |explicit: Option<String>, var: &str, default: String| {
            explicit.or_else(|| lookup(var)).unwrap_or(default)
        };

        let tools = ToolConfig {
            assembler: pick(overrides.assembler, "AS", defaults.tools.assembler),
            compiler: pick(overrides.compiler, "CC", defaults.tools.compiler),
            linker: pick(overrides.linker, "LD", defaults.tools.linker),
            emulator: pick(overrides.emulator, "QEMU", defaults.tools.emulator),
        };
        let flags = FlagConfig {
            base_cflags: pick(overrides.base_cflags, "BASE_CFLAGS", defaults.flags.base_cflags),
            debug_cflags: pick(overrides.debug_cflags, "DEBUG_CFLAGS", defaults.flags.debug_cflags),
            ldflags: pick(overrides.ldflags, "LDFLAGS", defaults.flags.ldflags),
            asmflags: pick(overrides.asmflags, "ASMFLAGS", defaults.flags.asmflags),
            extra_cflags: pick(overrides.extra_cflags, "EXTRA_CFLAGS", defaults.flags.extra_cflags),
            emulator_opts: pick(overrides.emulator_opts, "QEMU_OPTS", defaults.flags.emulator_opts),
        };

        Self {
            tools,
            flags,
            ..defaults
        }
    }

    /// Replace the source lists, keeping everything else.
    pub fn with_sources<A, C>(mut self, asm: A, c: C) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        self.asm_sources = asm.into_iter().map(Into::into).collect();
        self.c_sources = c.into_iter().map(Into::into).collect();
        self
    }

    /// Linked image path, relative to the project root.
    pub fn kernel_image(&self) -> PathBuf {
        self.build_dir.join(KERNEL_IMAGE_NAME)
    }
}
