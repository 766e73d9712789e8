//! In-process radio for host runs and tests.
//!
//! Records every call, can be told to fail a specific step, and lets the
//! caller inject events as if stations were joining.

use super::{EventCallback, RadioError, RadioEvent, RadioStack};
use crate::config::AccessPointConfig;
use log::info;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A [`RadioStack`] step, as recorded by [`SimulatedRadio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioCall {
    Init,
    Subscribe,
    SetMode,
    ApplyConfig,
    Start,
    Stop,
}

#[derive(Default)]
struct State {
    calls: Vec<RadioCall>,
    failure: Option<(RadioCall, RadioError)>,
    callback: Option<EventCallback>,
    applied: Option<AccessPointConfig>,
    running: bool,
    single_init: bool,
    initialized: bool,
}

/// Simulated radio. Clones share state, so a test can keep one clone while
/// the provisioner owns another.
#[derive(Clone, Default)]
pub struct SimulatedRadio {
    state: Arc<Mutex<State>>,
}

impl SimulatedRadio {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A radio whose driver can be brought up only once, like the ESP32
    /// modem peripheral. A second `init` fails.
    pub fn with_single_init() -> Self {
        let radio = Self::default();
        radio.lock().single_init = true;
        radio
    }

    /// Make `call` fail with `error` from now on.
    pub fn fail_on(&self, call: RadioCall, error: RadioError) {
        self.lock().failure = Some((call, error));
    }

    pub fn clear_failure(&self) {
        self.lock().failure = None;
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<RadioCall> {
        self.lock().calls.clone()
    }

    /// The last configuration applied.
    pub fn applied_config(&self) -> Option<AccessPointConfig> {
        self.lock().applied.clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Deliver `event` to the subscribed callback.
    ///
    /// Returns `false` if nothing is subscribed yet.
    pub fn emit(&self, event: RadioEvent) -> bool {
        // Release the lock before calling out; the callback may take its own.
        let callback = self.lock().callback.clone();
        match callback {
            Some(cb) => {
                cb(event);
                true
            }
            None => false,
        }
    }

    fn record(&self, call: RadioCall) -> Result<MutexGuard<'_, State>, RadioError> {
        let mut state = self.lock();
        state.calls.push(call);
        if let Some((failing, error)) = &state.failure {
            if *failing == call {
                return Err(error.clone());
            }
        }
        Ok(state)
    }
}

impl RadioStack for SimulatedRadio {
    fn init(&mut self) -> Result<(), RadioError> {
        let mut state = self.record(RadioCall::Init)?;
        if state.single_init && state.initialized {
            return Err(RadioError::new("modem already in use"));
        }
        state.initialized = true;
        Ok(())
    }

    fn subscribe(&mut self, callback: EventCallback) -> Result<(), RadioError> {
        self.record(RadioCall::Subscribe)?.callback = Some(callback);
        Ok(())
    }

    fn set_mode_access_point(&mut self) -> Result<(), RadioError> {
        self.record(RadioCall::SetMode)?;
        Ok(())
    }

    fn apply_config(&mut self, config: &AccessPointConfig) -> Result<(), RadioError> {
        self.record(RadioCall::ApplyConfig)?.applied = Some(config.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), RadioError> {
        let mut state = self.record(RadioCall::Start)?;
        state.running = true;
        if let Some(config) = &state.applied {
            info!(
                "Simulated radio beaconing {} on channel {}",
                config.ssid, config.channel
            );
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RadioError> {
        self.record(RadioCall::Stop)?.running = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::MacAddress;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_without_subscriber() {
        let radio = SimulatedRadio::new();
        assert!(!radio.emit(RadioEvent::Unrecognized("x".into())));
    }

    #[test]
    fn test_emit_reaches_subscriber() {
        let mut radio = SimulatedRadio::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = seen.clone();
        radio
            .subscribe(Arc::new(move |_| {
                seen_cb.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();

        radio.emit(RadioEvent::StationConnected {
            mac: MacAddress([1, 2, 3, 4, 5, 6]),
            aid: 1,
        });
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_single_init_refuses_second_init() {
        let mut radio = SimulatedRadio::with_single_init();
        assert!(radio.init().is_ok());
        assert_eq!(radio.init(), Err(RadioError::new("modem already in use")));
        assert!(SimulatedRadio::new().init().is_ok());
    }

    #[test]
    fn test_failure_is_recorded() {
        let mut radio = SimulatedRadio::new();
        radio.fail_on(RadioCall::Init, RadioError::new("no modem"));
        assert_eq!(radio.init(), Err(RadioError::new("no modem")));
        assert_eq!(radio.calls(), vec![RadioCall::Init]);
    }
}
