//! Build targets
//!
//! Every target is a fixed phase sequence: assemble, compile, link, then
//! optionally boot the image. Phases run strictly in order and the first
//! failing tool aborts the target. Objects already written stay on disk.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};

use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use crate::flags::{self, FlagSet};
use crate::paths::{self, ASM_OBJECT_SUFFIX, C_OBJECT_SUFFIX};
use crate::tool::{self, Invocation, ToolRunner};

/// Define always passed to the compiler in debug builds.
pub const DEBUG_DEFINE: &str = "-DDEBUG";

/// Which phases to run
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Assemble, compile and link.
    #[default]
    All,
    /// Build with debug flags, then boot with the serial port on stdio.
    Debug,
    /// Build, then boot.
    Run,
    /// Remove the build root.
    Clean,
}

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Target::All => "all",
            Target::Debug => "debug",
            Target::Run => "run",
            Target::Clean => "clean",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful target did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Image linked; `emulator_ok` is `None` when no emulator was launched.
    Built {
        image: PathBuf,
        emulator_ok: Option<bool>,
    },
    Cleaned,
    /// `clean` found no build root.
    AlreadyClean,
}

/// Tokenized flags for every phase of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseFlags {
    pub asm: FlagSet,
    pub cc: FlagSet,
    pub ld: FlagSet,
    pub emulator: FlagSet,
}

/// Drives the tools for one configuration.
pub struct Pipeline<'a, R: ToolRunner> {
    config: &'a BuildConfig,
    runner: R,
    root: PathBuf,
    check_tools: bool,
}

impl<'a, R: ToolRunner> Pipeline<'a, R> {
    pub fn new(config: &'a BuildConfig, runner: R) -> Self {
        Self {
            config,
            runner,
            root: PathBuf::from("."),
            check_tools: true,
        }
    }

    /// Project root: tools run here and the build root lives beneath it.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn check_tools(mut self, enabled: bool) -> Self {
        self.check_tools = enabled;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn execute(&self, target: Target) -> Result<Outcome> {
        info!("target: {target}");
        let (debug, serial_stdio) = match target {
            Target::All | Target::Run => (false, false),
            Target::Debug => (true, true),
            Target::Clean => return self.clean(),
        };

        // Every flag string is split before the first tool runs.
        let flags = self.phase_flags(debug)?;
        let image = self.build(&flags)?;
        let emulator_ok = match target {
            Target::Debug | Target::Run => {
                Some(self.launch_emulator(serial_stdio, &flags.emulator))
            }
            _ => None,
        };
        Ok(Outcome::Built { image, emulator_ok })
    }

    pub fn phase_flags(&self, debug: bool) -> Result<PhaseFlags> {
        let flags = &self.config.flags;
        Ok(PhaseFlags {
            asm: flags::split(&flags.asmflags)?,
            cc: self.compile_flags(debug)?,
            ld: flags::split(&flags.ldflags)?,
            emulator: flags::split(&flags.emulator_opts)?,
        })
    }

    /// Compiler flags for a release or debug build.
    pub fn compile_flags(&self, debug: bool) -> Result<FlagSet> {
        let flags = &self.config.flags;
        let mode = if debug {
            format!("{} {DEBUG_DEFINE}", flags.debug_cflags)
        } else {
            String::new()
        };
        flags::compose(&flags.base_cflags, &mode, &flags.extra_cflags)
    }

    fn build(&self, flags: &PhaseFlags) -> Result<PathBuf> {
        self.ensure_build_dir()?;
        self.assemble_all(&flags.asm)?;
        self.compile_all(&flags.cc)?;
        let objects = self.collect_objects();
        self.link(&objects, &flags.ld)
    }

    pub fn ensure_build_dir(&self) -> Result<()> {
        let dir = self.root.join(&self.config.build_dir);
        fs::create_dir_all(&dir).map_err(|e| BuildError::filesystem(&dir, e))?;
        info!("build directory {} ready", dir.display());
        Ok(())
    }

    /// Assemble every assembly source in list order; stops at the first failure.
    pub fn assemble_all(&self, asmflags: &FlagSet) -> Result<Vec<PathBuf>> {
        let assembler = &self.config.tools.assembler;
        self.check(assembler);

        let mut objects = Vec::with_capacity(self.config.asm_sources.len());
        for src in &self.config.asm_sources {
            let out = self.prepare_object(src, ASM_OBJECT_SUFFIX)?;
            let inv = self
                .invocation(assembler)
                .args(asmflags.iter().cloned())
                .arg(src.as_str())
                .arg("-o")
                .arg(paths::to_posix(&out));
            self.runner.run(&inv)?;
            objects.push(out);
        }
        Ok(objects)
    }

    /// Compile every C source in list order; stops at the first failure.
    pub fn compile_all(&self, cflags: &FlagSet) -> Result<Vec<PathBuf>> {
        let compiler = &self.config.tools.compiler;
        self.check(compiler);

        let mut objects = Vec::with_capacity(self.config.c_sources.len());
        for src in &self.config.c_sources {
            let out = self.prepare_object(src, C_OBJECT_SUFFIX)?;
            let inv = self
                .invocation(compiler)
                .args(cflags.iter().cloned())
                .arg("-c")
                .arg(src.as_str())
                .arg("-o")
                .arg(paths::to_posix(&out));
            self.runner.run(&inv)?;
            objects.push(out);
        }
        Ok(objects)
    }

    /// All objects in link order: assembly objects first, then C objects.
    pub fn collect_objects(&self) -> Vec<PathBuf> {
        let build_dir = &self.config.build_dir;
        let asm = self
            .config
            .asm_sources
            .iter()
            .map(|s| paths::object_path(build_dir, s, ASM_OBJECT_SUFFIX));
        let c = self
            .config
            .c_sources
            .iter()
            .map(|s| paths::object_path(build_dir, s, C_OBJECT_SUFFIX));
        asm.chain(c).collect()
    }

    pub fn link(&self, objects: &[PathBuf], ldflags: &FlagSet) -> Result<PathBuf> {
        let linker = &self.config.tools.linker;
        self.check(linker);
        let image = self.config.kernel_image();
        let inv = self
            .invocation(linker)
            .args(ldflags.iter().cloned())
            .arg("-o")
            .arg(paths::to_posix(&image))
            .args(objects.iter().map(|o| paths::to_posix(o)));
        self.runner.run(&inv)?;
        info!("kernel linked -> {}", paths::to_posix(&image));
        Ok(image)
    }

    /// Boot the image. The build already succeeded, so an emulator failure
    /// is only reported; the return value says whether it exited cleanly.
    pub fn launch_emulator(&self, serial_stdio: bool, opts: &FlagSet) -> bool {
        let emulator = &self.config.tools.emulator;
        self.check(emulator);
        let mut inv = self
            .invocation(emulator)
            .arg("-kernel")
            .arg(paths::to_posix(&self.config.kernel_image()));
        if serial_stdio {
            inv = inv.args(["-serial", "stdio"]);
        }
        inv = inv.args(opts.iter().cloned());

        match self.runner.run(&inv) {
            Ok(()) => true,
            Err(e) => {
                warn!("emulator: {e}");
                false
            }
        }
    }

    /// Remove the build root, or report that there is nothing to remove.
    pub fn clean(&self) -> Result<Outcome> {
        let dir = self.root.join(&self.config.build_dir);
        if !dir.exists() {
            info!("{} not found, nothing to clean", dir.display());
            return Ok(Outcome::AlreadyClean);
        }
        info!("removing {} ...", dir.display());
        fs::remove_dir_all(&dir).map_err(|e| BuildError::filesystem(&dir, e))?;
        info!("removed");
        Ok(Outcome::Cleaned)
    }

    fn invocation(&self, program: &str) -> Invocation {
        Invocation::new(program).current_dir(&self.root)
    }

    /// Object path for `src`, with its parent directory created.
    fn prepare_object(&self, src: &str, suffix: &str) -> Result<PathBuf> {
        let out = paths::object_path(&self.config.build_dir, src, suffix);
        if let Some(parent) = self.root.join(&out).parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::filesystem(parent, e))?;
        }
        Ok(out)
    }

    fn check(&self, name: &str) {
        if self.check_tools {
            tool::check_tool(name);
        }
    }
}

/// Advisory presence check for every configured tool.
pub fn check_all_tools(config: &BuildConfig) -> usize {
    config
        .tools
        .all()
        .into_iter()
        .filter(|name| tool::check_tool(name).is_none())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::MockToolRunner;
    use mockall::Sequence;

    fn small_config() -> BuildConfig {
        BuildConfig::default().with_sources(["a.asm", "b.asm"], ["c.c"])
    }

    #[test]
    fn test_target_names_match_command_line() {
        use clap::ValueEnum;

        for t in Target::value_variants() {
            assert_eq!(Target::from_str(t.as_str(), false).unwrap(), *t);
        }
        assert!(Target::from_str("install", false).is_err());
        assert_eq!(Target::default(), Target::All);
    }

    #[test]
    fn test_phase_flags_split_every_string() {
        let mut config = small_config();
        config.flags.emulator_opts = "-append 'console=ttyS0 quiet'".to_string();
        let pipeline = Pipeline::new(&config, MockToolRunner::new());
        let flags = pipeline.phase_flags(true).unwrap();
        assert_eq!(flags.asm, ["-f", "elf32"]);
        assert_eq!(flags.cc, ["-m32", "-g", "-O0", "-DDEBUG"]);
        assert_eq!(flags.ld, ["-m", "elf_i386", "-T", "link.ld"]);
        assert_eq!(flags.emulator, ["-append", "console=ttyS0 quiet"]);
    }

    #[test]
    fn test_malformed_flag_strings_stop_before_any_tool() {
        let bad: [(fn(&mut BuildConfig), &str); 4] = [
            (|c| c.flags.asmflags = "-f 'elf32".to_string(), "asmflags"),
            (|c| c.flags.base_cflags = "-m32 \\".to_string(), "base_cflags"),
            (|c| c.flags.ldflags = "-T 'link.ld".to_string(), "ldflags"),
            (|c| c.flags.emulator_opts = "-append 'console=ttyS0".to_string(), "emulator_opts"),
        ];
        for (corrupt, name) in bad {
            for target in [Target::All, Target::Debug, Target::Run] {
                let mut config = small_config();
                corrupt(&mut config);
                let dir = tempfile::tempdir().unwrap();
                // No expectations: any tool invocation panics.
                let pipeline = Pipeline::new(&config, MockToolRunner::new())
                    .with_root(dir.path())
                    .check_tools(false);
                let err = pipeline.execute(target).unwrap_err();
                assert!(
                    matches!(err, BuildError::FlagSyntax { .. }),
                    "{name} with {target}: {err:?}"
                );
                assert!(!dir.path().join("build").exists(), "{name} with {target}");
            }
        }
    }

    #[test]
    fn test_compile_flags_per_mode() {
        let mut config = small_config();
        config.flags.extra_cflags = "-Wall".to_string();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(&config, MockToolRunner::new()).with_root(dir.path());
        assert_eq!(pipeline.compile_flags(false).unwrap(), ["-m32", "-Wall"]);
        assert_eq!(
            pipeline.compile_flags(true).unwrap(),
            ["-m32", "-g", "-O0", "-DDEBUG", "-Wall"]
        );
    }

    #[test]
    fn test_phases_run_in_order() {
        let config = small_config();
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockToolRunner::new();
        let mut seq = Sequence::new();
        for (program, calls) in [("nasm", 2), ("gcc", 1), ("ld", 1)] {
            runner
                .expect_run()
                .withf(move |inv| inv.program() == program)
                .times(calls)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let pipeline = Pipeline::new(&config, runner)
            .with_root(dir.path())
            .check_tools(false);
        let outcome = pipeline.execute(Target::All).unwrap();
        assert_eq!(
            outcome,
            Outcome::Built {
                image: PathBuf::from("build").join("kernel"),
                emulator_ok: None,
            }
        );
        assert!(dir.path().join("build").is_dir());
    }

    #[test]
    fn test_debug_boots_once_with_serial_after_link() {
        let config = small_config();
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockToolRunner::new();
        let mut seq = Sequence::new();
        runner
            .expect_run()
            .withf(|inv| inv.program() != "qemu-system-i386")
            .times(4)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        runner
            .expect_run()
            .withf(|inv| {
                inv.tokens
                    == [
                        "qemu-system-i386",
                        "-kernel",
                        "build/kernel",
                        "-serial",
                        "stdio",
                    ]
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let pipeline = Pipeline::new(&config, runner)
            .with_root(dir.path())
            .check_tools(false);
        let outcome = pipeline.execute(Target::Debug).unwrap();
        assert!(matches!(outcome, Outcome::Built { emulator_ok: Some(true), .. }));
    }

    #[test]
    fn test_emulator_failure_does_not_fail_run() {
        let mut config = small_config();
        config.flags.emulator_opts = "-m 64M".to_string();
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockToolRunner::new();
        runner
            .expect_run()
            .withf(|inv| inv.program() != "qemu-system-i386")
            .times(4)
            .returning(|_| Ok(()));
        runner
            .expect_run()
            .withf(|inv| inv.tokens == ["qemu-system-i386", "-kernel", "build/kernel", "-m", "64M"])
            .times(1)
            .returning(|inv| {
                Err(BuildError::ToolFailed {
                    code: Some(1),
                    command: inv.command_line(),
                })
            });

        let pipeline = Pipeline::new(&config, runner)
            .with_root(dir.path())
            .check_tools(false);
        let outcome = pipeline.execute(Target::Run).unwrap();
        assert!(matches!(outcome, Outcome::Built { emulator_ok: Some(false), .. }));
    }

    #[test]
    fn test_assemble_failure_stops_phase() {
        let config = small_config();
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockToolRunner::new();
        runner.expect_run().times(1).returning(|inv| {
            Err(BuildError::ToolFailed {
                code: Some(2),
                command: inv.command_line(),
            })
        });

        let pipeline = Pipeline::new(&config, runner)
            .with_root(dir.path())
            .check_tools(false);
        let err = pipeline.execute(Target::Run).unwrap_err();
        assert!(matches!(err, BuildError::ToolFailed { code: Some(2), .. }));
    }

    #[test]
    fn test_clean_never_invokes_tools() {
        let config = small_config();
        let dir = tempfile::tempdir().unwrap();
        let runner = MockToolRunner::new();
        let pipeline = Pipeline::new(&config, runner).with_root(dir.path());
        assert_eq!(pipeline.execute(Target::Clean).unwrap(), Outcome::AlreadyClean);
    }

    #[test]
    fn test_collect_objects_link_order() {
        let config = BuildConfig::default().with_sources(["x.asm", "y.asm"], ["p.c", "q.c"]);
        let pipeline = Pipeline::new(&config, MockToolRunner::new());
        let objects: Vec<String> = pipeline
            .collect_objects()
            .iter()
            .map(|o| paths::to_posix(o))
            .collect();
        assert_eq!(
            objects,
            ["build/x.asm.o", "build/y.asm.o", "build/p.c.c.o", "build/q.c.c.o"]
        );
    }
}
