use crate::command::{CommandContext, CommandFactory, CommandSummary, ExecutableCommand, ExitCode};
use crate::config::Config;
use crate::env::Environment;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Raised by [`ExternalCommand`] when the child outlives its time limit.
#[derive(Debug, Error)]
#[error("timed out after {}s", .0.as_secs())]
pub struct TimeoutElapsed(pub Duration);

/// Handlers stored as `<dir>/<name>.<extension>` files.
///
/// A relative `dir` is taken relative to the environment's working directory.
#[derive(Debug, Clone)]
pub struct HandlerDir {
    dir: PathBuf,
    extension: String,
    interpreter: Option<String>,
    timeout: Option<Duration>,
}

impl HandlerDir {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            interpreter: None,
            timeout: None,
        }
    }

    /// Program that runs handler files, e.g. `python3`. `None` executes the file itself.
    pub fn with_interpreter(mut self, interpreter: Option<String>) -> Self {
        self.interpreter = interpreter.filter(|program| !program.trim().is_empty());
        self
    }

    /// Kill handlers that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.handlers_dir, &config.extension)
            .with_interpreter(config.interpreter.clone())
            .with_timeout(config.timeout())
    }

    /// Location a handler for `name` would have, or `None` if `name` is not a
    /// plain file name (empty, `.`/`..`, or containing a path separator).
    pub fn handler_path(&self, env: &Environment, name: &str) -> Option<PathBuf> {
        if !is_plain_name(name) {
            return None;
        }
        Some(
            env.current_dir
                .join(&self.dir)
                .join(format!("{name}.{}", self.extension)),
        )
    }

    fn find_handler(&self, env: &Environment, name: &str) -> Option<PathBuf> {
        let path = self.handler_path(env, name)?;
        find_by_path(&path).map(Path::to_path_buf)
    }
}

fn is_plain_name(name: &str) -> bool {
    if name.chars().any(std::path::is_separator) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}

impl CommandFactory for HandlerDir {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        options: &[String],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let path = self.find_handler(env, name)?;
        tracing::debug!(command = name, path = %path.display(), "resolved handler file");
        Some(Box::new(ExternalCommand {
            path,
            options: options.to_vec(),
            interpreter: self.interpreter.clone(),
            timeout: self.timeout,
        }))
    }

    fn list(&self, env: &Environment) -> Vec<CommandSummary> {
        let dir = env.current_dir.join(&self.dir);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!(dir = %dir.display(), %err, "handler directory not readable");
                return Vec::new();
            }
        };

        // The extension may itself contain dots, so match on the whole file name.
        let suffix = format!(".{}", self.extension);
        let mut summaries: Vec<CommandSummary> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let file_name = entry.file_name().into_string().ok()?;
                let name = file_name.strip_suffix(&suffix)?;
                // Listing must agree with resolution.
                let path = self.find_handler(env, name)?;
                Some(CommandSummary {
                    name: name.to_owned(),
                    description: format!("handler file {}", path.display()),
                })
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}

/// A handler file bound to one invocation's options.
pub struct ExternalCommand {
    path: PathBuf,
    options: Vec<String>,
    interpreter: Option<String>,
    timeout: Option<Duration>,
}

impl ExternalCommand {
    fn command(&self) -> Command {
        match &self.interpreter {
            Some(program) => {
                let mut cmd = Command::new(program);
                cmd.arg(&self.path);
                cmd
            }
            None => Command::new(&self.path),
        }
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        _stdout: &mut dyn Write,
        ctx: &CommandContext<'_>,
    ) -> Result<ExitCode> {
        let mut child = self
            .command()
            .args(&self.options)
            .envs(ctx.env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&ctx.env.current_dir)
            .spawn()
            .with_context(|| format!("cannot start {}", self.path.display()))?;

        let exit_status = match self.timeout {
            None => child
                .wait()
                .with_context(|| format!("cannot wait for {}", self.path.display()))?,
            Some(limit) => wait_with_timeout(&mut child, limit, &self.path)?,
        };
        match exit_status.code() {
            Some(x) => Ok(x),
            None => Ok(terminated_by_signal(exit_status)),
        }
    }
}

/// Poll the child until it exits or `limit` elapses; on expiry the child is killed
/// and reaped, and [`TimeoutElapsed`] is returned.
fn wait_with_timeout(child: &mut Child, limit: Duration, path: &Path) -> Result<ExitStatus> {
    let deadline = Instant::now() + limit;
    loop {
        let polled = child
            .try_wait()
            .with_context(|| format!("cannot wait for {}", path.display()))?;
        if let Some(status) = polled {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TimeoutElapsed(limit).into());
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use std::fs;

    #[test]
    fn plain_names_only() {
        assert!(is_plain_name("build"));
        assert!(is_plain_name("gen-msvc"));
        assert!(!is_plain_name(""));
        assert!(!is_plain_name("."));
        assert!(!is_plain_name(".."));
        assert!(!is_plain_name("../build"));
        assert!(!is_plain_name("tools/build"));
        assert!(!is_plain_name("build/"));
    }

    #[test]
    fn handler_path_follows_convention() {
        let handlers = HandlerDir::new("nkentools/commands", "py");
        let env = Environment::empty("/work");
        assert_eq!(
            handlers.handler_path(&env, "build"),
            Some(PathBuf::from("/work/nkentools/commands/build.py"))
        );
        assert_eq!(handlers.handler_path(&env, "../build"), None);
    }

    #[test]
    fn resolves_existing_files_exactly() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("build.py"), "").unwrap();
        fs::create_dir(dir.path().join("gen.py")).unwrap();
        let handlers = HandlerDir::new(dir.path(), "py");
        let env = Environment::empty(dir.path());

        assert!(handlers.try_create(&env, "build", &[]).is_some());
        assert!(handlers.try_create(&env, "Build", &[]).is_none());
        assert!(handlers.try_create(&env, "buil", &[]).is_none());
        // directories are not handlers
        assert!(handlers.try_create(&env, "gen", &[]).is_none());
    }

    #[test]
    fn listing_matches_resolution() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["sign.py", "build.py", "README.md", "__init__"] {
            fs::write(dir.path().join(file), "").unwrap();
        }
        fs::create_dir(dir.path().join("gen.py")).unwrap();
        let handlers = HandlerDir::new(dir.path(), "py");
        let env = Environment::empty(dir.path());

        let names: Vec<String> = handlers.list(&env).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["build", "sign"]);
        for name in &names {
            assert!(handlers.try_create(&env, name, &[]).is_some());
        }
    }

    #[test]
    fn dotted_extension_lists_what_resolves() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["pack.tar.py", "build.py", "tar.py", ".tar.py"] {
            fs::write(dir.path().join(file), "").unwrap();
        }
        let handlers = HandlerDir::new(dir.path(), "tar.py");
        let env = Environment::empty(dir.path());

        let listed = handlers.list(&env);
        let names: Vec<&str> = listed.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["pack"]);
        assert!(handlers.try_create(&env, "pack", &[]).is_some());
        assert!(listed[0].description.starts_with("handler file "));
        assert!(listed[0].description.ends_with("pack.tar.py"));
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let handlers = HandlerDir::new(dir.path().join("absent"), "py");
        let env = Environment::empty(dir.path());
        assert!(handlers.list(&env).is_empty());
        assert!(handlers.try_create(&env, "build", &[]).is_none());
    }

    #[cfg(unix)]
    fn run(handlers: &HandlerDir, env: &Environment, name: &str, options: &[&str]) -> Result<ExitCode> {
        let registry = Registry::new(Vec::new());
        let ctx = CommandContext { env, registry: &registry };
        let options: Vec<String> = options.iter().map(|s| s.to_string()).collect();
        let cmd = handlers
            .try_create(env, name, &options)
            .expect("handler should resolve");
        cmd.execute(&mut Vec::new(), &ctx)
    }

    #[cfg(unix)]
    fn sh_handlers(dir: &Path) -> HandlerDir {
        HandlerDir::new(dir, "sh").with_interpreter(Some("sh".to_string()))
    }

    #[test]
    #[cfg(unix)]
    fn exit_code_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ok.sh"), "exit 0\n").unwrap();
        fs::write(dir.path().join("fail.sh"), "exit 3\n").unwrap();
        let handlers = sh_handlers(dir.path());
        let env = Environment::empty(dir.path());

        assert_eq!(run(&handlers, &env, "ok", &[]).unwrap(), 0);
        assert_eq!(run(&handlers, &env, "fail", &[]).unwrap(), 3);
    }

    #[test]
    #[cfg(unix)]
    fn options_are_passed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("echo.sh"),
            "printf '%s\\n' \"$@\" > args.txt\n",
        )
        .unwrap();
        let handlers = sh_handlers(dir.path());
        let env = Environment::empty(dir.path());

        let code = run(&handlers, &env, "echo", &["gradle", "--path", "./my project"]).unwrap();
        assert_eq!(code, 0);
        let written = fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert_eq!(written, "gradle\n--path\n./my project\n");
    }

    #[test]
    #[cfg(unix)]
    fn environment_reaches_handler() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("where.sh"),
            "printf '%s' \"$NKEN_JDK\" > jdk.txt\n",
        )
        .unwrap();
        let handlers = sh_handlers(dir.path());
        let mut env = Environment::empty(dir.path());
        env.set_var("NKEN_JDK", "/opt/jdk-17");

        assert_eq!(run(&handlers, &env, "where", &[]).unwrap(), 0);
        // the handler ran in env.current_dir
        let written = fs::read_to_string(dir.path().join("jdk.txt")).unwrap();
        assert_eq!(written, "/opt/jdk-17");
    }

    #[test]
    #[cfg(unix)]
    fn slow_handler_is_killed_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hang.sh"), "sleep 10\n").unwrap();
        let handlers = sh_handlers(dir.path()).with_timeout(Some(Duration::from_millis(200)));
        let env = Environment::empty(dir.path());

        let started = Instant::now();
        let err = run(&handlers, &env, "hang", &[]).unwrap_err();
        assert!(err.downcast_ref::<TimeoutElapsed>().is_some());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    #[cfg(unix)]
    fn fast_handler_finishes_under_timeout() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("quick.sh"), "exit 7\n").unwrap();
        let handlers = sh_handlers(dir.path()).with_timeout(Some(Duration::from_secs(5)));
        let env = Environment::empty(dir.path());

        assert_eq!(run(&handlers, &env, "quick", &[]).unwrap(), 7);
    }

    #[test]
    #[cfg(unix)]
    fn missing_interpreter_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("build.sh"), "exit 0\n").unwrap();
        let handlers = HandlerDir::new(dir.path(), "sh")
            .with_interpreter(Some("definitely-not-an-interpreter-42".to_string()));
        let env = Environment::empty(dir.path());

        assert!(run(&handlers, &env, "build", &[]).is_err());
    }
}
