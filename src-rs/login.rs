use std::fmt;

use tracing::{debug, info, warn};

use crate::config::TimeoutConfig;
use crate::error::AttemptError;
use crate::layout::{EntryMode, LoginPlan, Point};
use crate::platform::{Desktop, Key};
use crate::sleep::Sleeper;

pub struct Credentials {
    pub account: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Init,
    EnteringLoginUi,
    LocatingPrimaryButton,
    LocatingFallbackButton,
    EnteringCredentials { anchor: Point },
    LocatingConsentCheckbox { anchor: Point },
    Submitting { anchor: Point },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next(LoginState),
    /// The submit button was clicked at the given anchor.
    Submitted(Point),
}

/// Drives the whiteboard's login form from its start screen to the submit click.
pub struct LoginFlow<'a> {
    plan: &'a LoginPlan,
    timeouts: &'a TimeoutConfig,
}

impl<'a> LoginFlow<'a> {
    pub fn new(plan: &'a LoginPlan, timeouts: &'a TimeoutConfig) -> Self {
        Self { plan, timeouts }
    }

    /// Runs every state in order. Returns the anchor all field clicks were
    /// computed from.
    pub fn run(
        &self,
        desktop: &mut dyn Desktop,
        sleeper: &dyn Sleeper,
        credentials: &Credentials,
    ) -> Result<Point, AttemptError> {
        info!("logging in");
        let mut state = LoginState::Init;
        loop {
            debug!(?state, "login state");
            match self.step(state, desktop, sleeper, credentials)? {
                Transition::Next(next) => state = next,
                Transition::Submitted(anchor) => {
                    info!("login submitted");
                    return Ok(anchor);
                }
            }
        }
    }

    pub fn step(
        &self,
        state: LoginState,
        desktop: &mut dyn Desktop,
        sleeper: &dyn Sleeper,
        credentials: &Credentials,
    ) -> Result<Transition, AttemptError> {
        let plan = self.plan;
        let confidence = plan.confidence;
        let next = match state {
            LoginState::Init => match plan.entry {
                EntryMode::Direct => {
                    info!("whiteboard opens on the login UI");
                    LoginState::LocatingPrimaryButton
                }
                EntryMode::Normal => LoginState::EnteringLoginUi,
            },
            LoginState::EnteringLoginUi => {
                info!("opening login UI");
                desktop.click(plan.layout.enter_login_ui_point(plan.scale))?;
                sleeper.sleep(self.timeouts.enter_login_ui());
                LoginState::LocatingPrimaryButton
            }
            LoginState::LocatingPrimaryButton => {
                match desktop.locate(&plan.templates.button, confidence)? {
                    Some(anchor) => {
                        info!("account login button found, clicking");
                        desktop.click(anchor)?;
                        sleeper.sleep(self.timeouts.switch_tab());
                        LoginState::EnteringCredentials { anchor }
                    }
                    None => {
                        warn!("account login button not found, trying selected variant");
                        LoginState::LocatingFallbackButton
                    }
                }
            }
            LoginState::LocatingFallbackButton => {
                match desktop.locate(&plan.templates.button_selected, confidence)? {
                    // Already on the account tab; nothing to click.
                    Some(anchor) => LoginState::EnteringCredentials { anchor },
                    None => return Err(AttemptError::ButtonNotLocated),
                }
            }
            LoginState::EnteringCredentials { anchor } => {
                info!("entering account");
                debug!(account = %credentials.account);
                desktop.click(anchor.offset(plan.layout.account_field, plan.scale))?;
                desktop.hotkey(&[Key::Ctrl, Key::A])?;
                desktop.press(Key::Backspace)?;
                desktop.type_text(&credentials.account)?;

                info!("entering password");
                desktop.click(anchor.offset(plan.layout.password_field, plan.scale))?;
                desktop.type_text(&credentials.password)?;
                LoginState::LocatingConsentCheckbox { anchor }
            }
            LoginState::LocatingConsentCheckbox { anchor } => {
                match desktop.locate(&plan.templates.checkbox, confidence)? {
                    Some(checkbox) => {
                        info!("consent checkbox found, clicking");
                        desktop.click(checkbox)?;
                        LoginState::Submitting { anchor }
                    }
                    None => return Err(AttemptError::CheckboxNotLocated),
                }
            }
            LoginState::Submitting { anchor } => {
                info!("clicking submit");
                desktop.click(anchor.offset(plan.layout.submit_button, plan.scale))?;
                return Ok(Transition::Submitted(anchor));
            }
        };
        Ok(Transition::Next(next))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::LoginConfig;
    use crate::error::PlatformError;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Event {
        Locate(PathBuf),
        Click(Point),
        Press(Key),
        Hotkey(Vec<Key>),
        Type(String),
        Focus(String),
        Sleep(Duration),
        Kill(String),
        Launch(PathBuf),
    }

    pub type Journal = Rc<RefCell<Vec<Event>>>;

    pub struct FakeDesktop {
        pub journal: Journal,
        pub screen: HashMap<PathBuf, Point>,
    }

    impl Desktop for FakeDesktop {
        fn locate(
            &mut self,
            template: &Path,
            _confidence: f32,
        ) -> Result<Option<Point>, PlatformError> {
            self.journal
                .borrow_mut()
                .push(Event::Locate(template.to_path_buf()));
            Ok(self.screen.get(template).copied())
        }

        fn click(&mut self, at: Point) -> Result<(), PlatformError> {
            self.journal.borrow_mut().push(Event::Click(at));
            Ok(())
        }

        fn press(&mut self, key: Key) -> Result<(), PlatformError> {
            self.journal.borrow_mut().push(Event::Press(key));
            Ok(())
        }

        fn hotkey(&mut self, keys: &[Key]) -> Result<(), PlatformError> {
            self.journal.borrow_mut().push(Event::Hotkey(keys.to_vec()));
            Ok(())
        }

        fn type_text(&mut self, text: &str) -> Result<(), PlatformError> {
            self.journal.borrow_mut().push(Event::Type(text.to_string()));
            Ok(())
        }

        fn focus_window(&mut self, title: &str) -> Result<bool, PlatformError> {
            self.journal.borrow_mut().push(Event::Focus(title.to_string()));
            Ok(true)
        }
    }

    pub struct FakeSleeper(pub Journal);

    impl Sleeper for FakeSleeper {
        fn sleep(&self, duration: Duration) {
            self.0.borrow_mut().push(Event::Sleep(duration));
        }
    }

    pub fn plan(is_4k: bool, directly: bool) -> LoginPlan {
        let login = LoginConfig {
            is_4k,
            directly,
            ..LoginConfig::default()
        };
        LoginPlan::from_config(&login, Path::new("res"))
    }

    pub fn credentials() -> Credentials {
        Credentials {
            account: "teacher01".to_string(),
            password: "s3cret".to_string(),
        }
    }

    fn clicks(journal: &Journal) -> Vec<Point> {
        journal
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Click(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    fn fixture(visible: &[(&Path, Point)]) -> (FakeDesktop, FakeSleeper, Journal) {
        let journal: Journal = Rc::default();
        let screen = visible
            .iter()
            .map(|(path, point)| (path.to_path_buf(), *point))
            .collect();
        (
            FakeDesktop {
                journal: Rc::clone(&journal),
                screen,
            },
            FakeSleeper(Rc::clone(&journal)),
            journal,
        )
    }

    #[test]
    fn full_sequence_in_normal_mode() {
        let plan = plan(false, false);
        let timeouts = TimeoutConfig::default();
        let anchor = Point::new(900, 500);
        let checkbox = Point::new(760, 760);
        let (mut desktop, sleeper, journal) = fixture(&[
            (plan.templates.button.as_path(), anchor),
            (plan.templates.checkbox.as_path(), checkbox),
        ]);

        let got = LoginFlow::new(&plan, &timeouts)
            .run(&mut desktop, &sleeper, &credentials())
            .unwrap();
        assert_eq!(got, anchor);

        assert_eq!(
            *journal.borrow(),
            vec![
                Event::Click(Point::new(172, 1044)),
                Event::Sleep(Duration::from_secs(3)),
                Event::Locate(plan.templates.button.clone()),
                Event::Click(anchor),
                Event::Sleep(Duration::from_secs(1)),
                Event::Click(Point::new(900, 570)),
                Event::Hotkey(vec![Key::Ctrl, Key::A]),
                Event::Press(Key::Backspace),
                Event::Type("teacher01".into()),
                Event::Click(Point::new(900, 634)),
                Event::Type("s3cret".into()),
                Event::Locate(plan.templates.checkbox.clone()),
                Event::Click(checkbox),
                Event::Click(Point::new(900, 698)),
            ]
        );
    }

    #[test]
    fn entering_login_ui_happens_only_without_direct_mode() {
        let timeouts = TimeoutConfig::default();
        for directly in [false, true] {
            for is_4k in [false, true] {
                let plan = plan(is_4k, directly);
                let (mut desktop, sleeper, journal) = fixture(&[]);
                let entry_click = Event::Click(plan.layout.enter_login_ui_point(plan.scale));

                let err = LoginFlow::new(&plan, &timeouts)
                    .run(&mut desktop, &sleeper, &credentials())
                    .unwrap_err();
                assert!(matches!(err, AttemptError::ButtonNotLocated));
                assert_eq!(journal.borrow().contains(&entry_click), !directly);
            }
        }
    }

    #[test]
    fn both_button_paths_reach_credentials_with_anchor() {
        let timeouts = TimeoutConfig::default();
        let plan = plan(false, true);
        let anchor = Point::new(640, 380);

        let (mut desktop, sleeper, journal) =
            fixture(&[(plan.templates.button.as_path(), anchor)]);
        let flow = LoginFlow::new(&plan, &timeouts);
        let primary = flow
            .step(
                LoginState::LocatingPrimaryButton,
                &mut desktop,
                &sleeper,
                &credentials(),
            )
            .unwrap();
        assert_eq!(
            primary,
            Transition::Next(LoginState::EnteringCredentials { anchor })
        );
        assert_eq!(clicks(&journal), vec![anchor]);

        let (mut desktop, sleeper, journal) =
            fixture(&[(plan.templates.button_selected.as_path(), anchor)]);
        let missed = flow
            .step(
                LoginState::LocatingPrimaryButton,
                &mut desktop,
                &sleeper,
                &credentials(),
            )
            .unwrap();
        assert_eq!(missed, Transition::Next(LoginState::LocatingFallbackButton));
        let fallback = flow
            .step(
                LoginState::LocatingFallbackButton,
                &mut desktop,
                &sleeper,
                &credentials(),
            )
            .unwrap();
        assert_eq!(
            fallback,
            Transition::Next(LoginState::EnteringCredentials { anchor })
        );
        assert!(clicks(&journal).is_empty());
        assert!(!journal
            .borrow()
            .iter()
            .any(|e| matches!(e, Event::Sleep(_))));
    }

    #[test]
    fn fields_use_scaled_offsets_in_4k() {
        let timeouts = TimeoutConfig::default();
        let plan = plan(true, true);
        let anchor = Point::new(1800, 1000);
        let (mut desktop, sleeper, journal) = fixture(&[
            (plan.templates.button_selected.as_path(), anchor),
            (plan.templates.checkbox.as_path(), Point::new(1500, 1500)),
        ]);
        LoginFlow::new(&plan, &timeouts)
            .run(&mut desktop, &sleeper, &credentials())
            .unwrap();

        assert_eq!(
            clicks(&journal),
            vec![
                Point::new(1800, 1140),
                Point::new(1800, 1268),
                Point::new(1500, 1500),
                Point::new(1800, 1396),
            ]
        );
        assert!(plan.templates.button_selected.ends_with("button_selected_direct_4k.png"));
    }

    #[test]
    fn missing_checkbox_fails_after_button_click() {
        let timeouts = TimeoutConfig::default();
        let plan = plan(false, true);
        let anchor = Point::new(700, 420);
        let (mut desktop, sleeper, journal) =
            fixture(&[(plan.templates.button.as_path(), anchor)]);

        let err = LoginFlow::new(&plan, &timeouts)
            .run(&mut desktop, &sleeper, &credentials())
            .unwrap_err();
        assert!(matches!(err, AttemptError::CheckboxNotLocated));

        let clicks = clicks(&journal);
        assert_eq!(clicks.first(), Some(&anchor));
        assert!(!clicks.contains(&Point::new(700, 618)));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let shown = format!("{:?}", credentials());
        assert!(shown.contains("teacher01"));
        assert!(!shown.contains("s3cret"));
    }
}
