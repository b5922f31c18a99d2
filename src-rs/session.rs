use std::path::Path;

use tracing::{info, warn};

use crate::config::{AppConfig, Config, LoginConfig, TimeoutConfig};
use crate::error::{AttemptError, ConfigError, RetryError};
use crate::layout::{LoginPlan, Point};
use crate::login::{Credentials, LoginFlow};
use crate::platform::Desktop;
use crate::process::{ProcessController, Processes};
use crate::retry::run_with_retry;
use crate::sleep::Sleeper;
use crate::warning::{Decision, WarningPrompt};

/// What to do before touching any process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Proceed,
    /// A pending skip request was consumed.
    Skipped,
    Cancelled,
}

/// Consumes a pending skip request, then asks the user when the warning is
/// enabled. A prompt that fails counts as consent.
pub fn preflight(
    config: &mut Config,
    path: &Path,
    prompt: &dyn WarningPrompt,
) -> Result<Gate, ConfigError> {
    if config.consume_skip(path)? {
        info!("skip requested, not logging in this time");
        return Ok(Gate::Skipped);
    }
    if !config.warning.enabled {
        return Ok(Gate::Proceed);
    }
    match prompt.ask(config.warning.timeout()) {
        Ok(Decision::Proceed) => Ok(Gate::Proceed),
        Ok(Decision::Cancel) => {
            info!("cancelled by user");
            Ok(Gate::Cancelled)
        }
        Err(err) => {
            warn!(error = %err, "warning prompt failed, continuing");
            Ok(Gate::Proceed)
        }
    }
}

/// One restart-and-login attempt, repeated cold by [`Session::run`].
pub struct Session {
    controller: ProcessController,
    plan: LoginPlan,
    timeouts: TimeoutConfig,
    window_title: String,
}

impl Session {
    pub fn new(login: &LoginConfig, resources: &Path) -> Self {
        Self {
            controller: ProcessController::new(
                login.easinote.clone(),
                login.timeout.clone(),
                login.kill_agent,
            ),
            plan: LoginPlan::from_config(login, resources),
            timeouts: login.timeout.clone(),
            window_title: login.easinote.window_title.clone(),
        }
    }

    pub fn attempt(
        &self,
        processes: &mut dyn Processes,
        desktop: &mut dyn Desktop,
        sleeper: &dyn Sleeper,
        credentials: &Credentials,
    ) -> Result<Point, AttemptError> {
        self.controller.restart(processes, sleeper)?;

        match desktop.focus_window(&self.window_title) {
            Ok(true) => info!("switched to \"{}\"", self.window_title),
            Ok(false) => warn!("no window titled \"{}\" found", self.window_title),
            Err(err) => warn!(error = %err, "failed to switch to \"{}\"", self.window_title),
        }

        LoginFlow::new(&self.plan, &self.timeouts).run(desktop, sleeper, credentials)
    }

    pub fn run(
        &self,
        app: &AppConfig,
        processes: &mut dyn Processes,
        desktop: &mut dyn Desktop,
        sleeper: &dyn Sleeper,
        credentials: &Credentials,
    ) -> Result<Point, RetryError<AttemptError>> {
        run_with_retry(app.max_attempts(), app.retry_delay(), sleeper, |_| {
            self.attempt(processes, desktop, sleeper, credentials)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::login::tests::{credentials, Event, FakeDesktop, FakeSleeper, Journal};
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::io;
    use std::path::PathBuf;
    use std::rc::Rc;
    use std::time::Duration;
    use tempfile::tempdir;

    struct FakeProcesses(Journal);

    impl Processes for FakeProcesses {
        fn install_path(&mut self) -> Option<PathBuf> {
            Some(PathBuf::from(r"C:\EasiNote\swenlauncher.exe"))
        }

        fn kill(&mut self, name: &str) -> io::Result<bool> {
            self.0.borrow_mut().push(Event::Kill(name.to_string()));
            Ok(true)
        }

        fn launch(&mut self, path: &Path, _args: &[String]) -> io::Result<()> {
            self.0.borrow_mut().push(Event::Launch(path.to_path_buf()));
            Ok(())
        }
    }

    struct ScriptedPrompt {
        answer: io::Result<Decision>,
        asked: Cell<u32>,
    }

    impl ScriptedPrompt {
        fn new(answer: io::Result<Decision>) -> Self {
            Self {
                answer,
                asked: Cell::new(0),
            }
        }
    }

    impl WarningPrompt for ScriptedPrompt {
        fn ask(&self, _timeout: Duration) -> io::Result<Decision> {
            self.asked.set(self.asked.get() + 1);
            match &self.answer {
                Ok(decision) => Ok(*decision),
                Err(err) => Err(io::Error::new(err.kind(), err.to_string())),
            }
        }
    }

    fn session(directly: bool) -> Session {
        let login = LoginConfig {
            directly,
            kill_agent: false,
            ..LoginConfig::default()
        };
        Session::new(&login, Path::new("res"))
    }

    fn count(journal: &Journal, wanted: &Event) -> usize {
        journal.borrow().iter().filter(|e| *e == wanted).count()
    }

    #[test]
    fn missing_checkbox_restarts_on_every_attempt() {
        let session = session(true);
        let journal: Journal = Rc::default();
        let mut processes = FakeProcesses(Rc::clone(&journal));
        let mut desktop = FakeDesktop {
            journal: Rc::clone(&journal),
            screen: HashMap::from([(session.plan.templates.button.clone(), Point::new(800, 450))]),
        };
        let sleeper = FakeSleeper(Rc::clone(&journal));
        let app = AppConfig {
            max_retries: 2,
            ..AppConfig::default()
        };

        let err = session
            .run(&app, &mut processes, &mut desktop, &sleeper, &credentials())
            .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert!(matches!(err.last, AttemptError::CheckboxNotLocated));
        assert_eq!(count(&journal, &Event::Kill("EasiNote.exe".into())), 3);
        assert_eq!(
            count(&journal, &Event::Launch(PathBuf::from(r"C:\EasiNote\swenlauncher.exe"))),
            3
        );
        assert_eq!(count(&journal, &Event::Click(Point::new(800, 450))), 3);
        assert_eq!(count(&journal, &Event::Sleep(Duration::from_secs(2))), 2);
    }

    #[test]
    fn attempt_focuses_window_between_restart_and_login() {
        let session = session(true);
        let journal: Journal = Rc::default();
        let mut processes = FakeProcesses(Rc::clone(&journal));
        let mut desktop = FakeDesktop {
            journal: Rc::clone(&journal),
            screen: HashMap::from([
                (session.plan.templates.button.clone(), Point::new(800, 450)),
                (session.plan.templates.checkbox.clone(), Point::new(700, 700)),
            ]),
        };
        let sleeper = FakeSleeper(Rc::clone(&journal));

        let anchor = session
            .attempt(&mut processes, &mut desktop, &sleeper, &credentials())
            .unwrap();
        assert_eq!(anchor, Point::new(800, 450));

        let events = journal.borrow();
        let launched = events
            .iter()
            .position(|e| matches!(e, Event::Launch(_)))
            .unwrap();
        let focused = events
            .iter()
            .position(|e| matches!(e, Event::Focus(_)))
            .unwrap();
        let located = events
            .iter()
            .position(|e| matches!(e, Event::Locate(_)))
            .unwrap();
        assert!(launched < focused && focused < located);
        assert_eq!(events[focused], Event::Focus("希沃白板".into()));
        assert_eq!(events.last(), Some(&Event::Click(Point::new(800, 648))));
    }

    #[test]
    fn pending_skip_is_consumed_without_prompting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.request_skip(&path).unwrap();

        let prompt = ScriptedPrompt::new(Ok(Decision::Proceed));
        assert_eq!(preflight(&mut config, &path, &prompt).unwrap(), Gate::Skipped);
        assert_eq!(prompt.asked.get(), 0);

        let (stored, _) = Config::load(&path).unwrap();
        assert!(!stored.login.skip_once);

        assert_eq!(preflight(&mut config, &path, &prompt).unwrap(), Gate::Proceed);
        assert_eq!(prompt.asked.get(), 1);
    }

    #[test]
    fn prompt_outcomes_map_to_gates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();

        let cancel = ScriptedPrompt::new(Ok(Decision::Cancel));
        assert_eq!(preflight(&mut config, &path, &cancel).unwrap(), Gate::Cancelled);

        let broken = ScriptedPrompt::new(Err(io::Error::new(io::ErrorKind::Other, "no display")));
        assert_eq!(preflight(&mut config, &path, &broken).unwrap(), Gate::Proceed);

        config.warning.enabled = false;
        assert_eq!(preflight(&mut config, &path, &cancel).unwrap(), Gate::Proceed);
        assert_eq!(cancel.asked.get(), 1);
    }
}
