//! Connection over a set of configured pins
//!
//! A [`GpioConnection`] binds pin configurations to one driver. Opening the
//! connection allocates every pin and starts a periodic poll of the inputs;
//! closing it stops the poll and releases every pin.
//!
//! Values seen through the connection are logical: reversal is applied and
//! switch inputs report their latched state. Each poll reads all inputs in
//! one batch, compares them with the previous raw levels and updates the
//! cached values. Notifications go out once the pin table is unlocked, so
//! callbacks and observers may call back into the connection.
//!
//! ```rust,ignore
//! let connection = GpioConnection::new(
//!     driver,
//!     GpioConnectionSettings::default(),
//!     [
//!         PinConfiguration::output(ProcessorPin::P18).named("led"),
//!         PinConfiguration::switch_input(ProcessorPin::P17).named("button"),
//!     ],
//! )?;
//! let events = connection.events();
//! for change in events.iter() {
//!     connection.set("led", change.value)?;
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};
use raspio_hal::{
    ConnectorPin, GpioDriver, GpioError, PinDirection, PinResistor, ProcessorPin, ProcessorPins,
};

use crate::configuration::{PinCallback, PinConfiguration};
use crate::error::ConnectionError;
use crate::settings::GpioConnectionSettings;
use crate::timer::PeriodicTimer;

/// Delay between opening and the first input poll
pub const OPEN_DELAY: Duration = Duration::from_millis(10);

/// Logical value change of a pin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinChange {
    pub pin: ProcessorPin,
    pub name: Option<String>,
    pub value: bool,
}

/// Receives every pin change of a connection
pub trait PinObserver: Send + Sync {
    fn pin_changed(&self, change: &PinChange);
}

impl<F> PinObserver for F
where
    F: Fn(&PinChange) + Send + Sync,
{
    fn pin_changed(&self, change: &PinChange) {
        self(change)
    }
}

/// Handle returned by [`GpioConnection::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Ways to designate a pin of a connection
#[derive(Debug, Clone, Copy)]
pub enum PinSelector<'a> {
    Name(&'a str),
    Connector(ConnectorPin),
    Processor(ProcessorPin),
    Configuration(&'a PinConfiguration),
}

impl<'a> From<&'a str> for PinSelector<'a> {
    fn from(name: &'a str) -> Self {
        PinSelector::Name(name)
    }
}

impl From<ConnectorPin> for PinSelector<'_> {
    fn from(pin: ConnectorPin) -> Self {
        PinSelector::Connector(pin)
    }
}

impl From<ProcessorPin> for PinSelector<'_> {
    fn from(pin: ProcessorPin) -> Self {
        PinSelector::Processor(pin)
    }
}

impl<'a> From<&'a PinConfiguration> for PinSelector<'a> {
    fn from(configuration: &'a PinConfiguration) -> Self {
        PinSelector::Configuration(configuration)
    }
}

impl fmt::Display for PinSelector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinSelector::Name(name) => write!(f, "'{name}'"),
            PinSelector::Connector(pin) => write!(f, "{pin}"),
            PinSelector::Processor(pin) => write!(f, "{pin}"),
            PinSelector::Configuration(configuration) => write!(f, "{configuration}"),
        }
    }
}

/// Pin table, guarded by the connection lock
#[derive(Debug, Default)]
struct ConnectionState {
    opened: bool,
    pins: BTreeMap<ProcessorPin, PinConfiguration>,
    names: HashMap<String, ProcessorPin>,
    /// Logical value of every configured pin
    values: HashMap<ProcessorPin, bool>,
    /// Allocated inputs
    inputs: ProcessorPins,
    /// Raw levels of the allocated inputs at the last poll
    raw_inputs: ProcessorPins,
}

impl ConnectionState {
    fn set_raw_input(&mut self, pin: ProcessorPin, raw: bool) {
        self.inputs.insert(pin);
        if raw {
            self.raw_inputs.insert(pin);
        } else {
            self.raw_inputs.remove(pin);
        }
    }

    fn forget_input(&mut self, pin: ProcessorPin) {
        self.inputs.remove(pin);
        self.raw_inputs.remove(pin);
    }
}

#[derive(Default)]
struct Observers {
    next_id: u64,
    observers: Vec<(ObserverId, Arc<dyn PinObserver>)>,
    channels: Vec<Sender<PinChange>>,
}

struct Notification {
    change: PinChange,
    callback: Option<PinCallback>,
}

impl Notification {
    fn new(configuration: &PinConfiguration, value: bool) -> Self {
        Self {
            change: PinChange {
                pin: configuration.pin(),
                name: configuration.name().map(str::to_owned),
                value,
            },
            callback: configuration.callback().cloned(),
        }
    }
}

/// State shared with the poll timer
struct Inner {
    driver: Arc<dyn GpioDriver>,
    settings: GpioConnectionSettings,
    state: Mutex<ConnectionState>,
    observers: Mutex<Observers>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, Observers> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(
        &self,
        state: &ConnectionState,
        selector: PinSelector<'_>,
    ) -> Result<ProcessorPin, ConnectionError> {
        let not_found = || ConnectionError::PinNotFound(selector.to_string());
        let pin = match selector {
            PinSelector::Name(name) => *state.names.get(name).ok_or_else(not_found)?,
            PinSelector::Connector(pin) => pin.to_processor(self.settings.pinout)?,
            PinSelector::Processor(pin) => pin,
            PinSelector::Configuration(configuration) => configuration.pin(),
        };
        if state.pins.contains_key(&pin) {
            Ok(pin)
        } else {
            Err(not_found())
        }
    }

    fn allocate_input(&self, pin: ProcessorPin, resistor: PinResistor) -> Result<bool, GpioError> {
        self.driver.allocate(pin, PinDirection::Input)?;
        if resistor != PinResistor::None {
            self.driver.set_pin_resistor(pin, resistor)?;
        }
        self.driver.read(pin)
    }

    /// Allocate a pin and record its initial value
    fn allocate(
        &self,
        state: &mut ConnectionState,
        configuration: &PinConfiguration,
    ) -> Result<(), GpioError> {
        let pin = configuration.pin();
        let result = match configuration {
            PinConfiguration::Output(output) => {
                let value = state.values.get(&pin).copied().unwrap_or(output.enabled);
                self.driver
                    .allocate(pin, PinDirection::Output)
                    .and_then(|()| self.driver.write(pin, configuration.raw_value(value)))
                    .map(|()| {
                        state.values.insert(pin, value);
                    })
            }
            PinConfiguration::Input(input) => self.allocate_input(pin, input.resistor).map(|raw| {
                state.set_raw_input(pin, raw);
                state.values.insert(pin, configuration.effective_value(raw));
            }),
            PinConfiguration::SwitchInput(switch) => {
                self.allocate_input(pin, switch.input.resistor).map(|raw| {
                    state.set_raw_input(pin, raw);
                    state.values.entry(pin).or_insert(switch.enabled);
                })
            }
        };

        if let Err(e) = result {
            state.forget_input(pin);
            if let Err(release) = self.driver.release(pin) {
                warn!("releasing {pin} after failed allocation: {release}");
            }
            return Err(e);
        }
        debug!("allocated {configuration}");
        Ok(())
    }

    /// Release a pin, driving outputs low first
    fn release(
        &self,
        state: &mut ConnectionState,
        configuration: &PinConfiguration,
    ) -> Result<(), GpioError> {
        let pin = configuration.pin();
        if configuration.direction() == PinDirection::Output {
            if let Err(e) = self.driver.write(pin, false) {
                warn!("driving {pin} low before release: {e}");
            }
        }
        self.driver.release(pin)?;
        state.forget_input(pin);
        debug!("released {configuration}");
        Ok(())
    }

    /// Release every listed pin, reporting the first failure
    fn release_all<'a>(
        &self,
        state: &mut ConnectionState,
        configurations: impl IntoIterator<Item = &'a PinConfiguration>,
    ) -> Result<(), ConnectionError> {
        let mut result = Ok(());
        for configuration in configurations {
            if let Err(e) = self.release(state, configuration) {
                warn!("releasing {configuration}: {e}");
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }
        result
    }

    fn check_input_pins(&self) -> Result<(), ConnectionError> {
        let pending = {
            let mut guard = self.state();
            let state = &mut *guard;
            if !state.opened || state.inputs.is_empty() {
                return Ok(());
            }

            let raw = self.driver.read_pins(state.inputs)? & state.inputs;
            let changed = raw ^ state.raw_inputs;
            state.raw_inputs = raw;
            trace!("poll: inputs {:#x}, changed {:#x}", raw.bits(), changed.bits());

            let mut pending = Vec::new();
            for pin in changed.iter() {
                let Some(configuration) = state.pins.get(&pin) else {
                    continue;
                };
                let active = configuration.effective_value(raw.contains(pin));
                let value = match configuration {
                    PinConfiguration::SwitchInput(_) if !active => continue,
                    PinConfiguration::SwitchInput(_) => {
                        !state.values.get(&pin).copied().unwrap_or(false)
                    }
                    PinConfiguration::Input(_) | PinConfiguration::Output(_) => active,
                };
                state.values.insert(pin, value);
                pending.push(Notification::new(configuration, value));
            }
            pending
        };

        self.dispatch(pending);
        Ok(())
    }

    fn dispatch(&self, pending: Vec<Notification>) {
        if pending.is_empty() {
            return;
        }

        let observers: Vec<Arc<dyn PinObserver>> = self
            .observers()
            .observers
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        for notification in &pending {
            if let Some(callback) = &notification.callback {
                callback(notification.change.value);
            }
            for observer in &observers {
                observer.pin_changed(&notification.change);
            }
        }

        // Receivers that were dropped unsubscribe themselves
        self.observers().channels.retain(|channel| {
            pending
                .iter()
                .all(|notification| channel.send(notification.change.clone()).is_ok())
        });
    }
}

/// Set of configured pins driven through one driver
pub struct GpioConnection {
    inner: Arc<Inner>,
    timer: Mutex<Box<dyn PeriodicTimer>>,
}

impl GpioConnection {
    /// Create a connection using the timer named in `settings`
    ///
    /// The connection is opened right away when `settings.opened` is set.
    pub fn new(
        driver: Arc<dyn GpioDriver>,
        settings: GpioConnectionSettings,
        pins: impl IntoIterator<Item = PinConfiguration>,
    ) -> Result<Self, ConnectionError> {
        let timer = settings.timer.create();
        Self::with_timer(driver, settings, timer, pins)
    }

    /// Create a connection polled by `timer`
    pub fn with_timer(
        driver: Arc<dyn GpioDriver>,
        settings: GpioConnectionSettings,
        timer: Box<dyn PeriodicTimer>,
        pins: impl IntoIterator<Item = PinConfiguration>,
    ) -> Result<Self, ConnectionError> {
        let opened = settings.opened;
        let connection = Self {
            inner: Arc::new(Inner {
                driver,
                settings,
                state: Mutex::new(ConnectionState::default()),
                observers: Mutex::new(Observers::default()),
            }),
            timer: Mutex::new(timer),
        };

        for configuration in pins {
            connection.add(configuration)?;
        }
        if opened {
            connection.open()?;
        }
        Ok(connection)
    }

    fn timer(&self) -> MutexGuard<'_, Box<dyn PeriodicTimer>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn driver(&self) -> &Arc<dyn GpioDriver> {
        &self.inner.driver
    }

    pub fn settings(&self) -> &GpioConnectionSettings {
        &self.inner.settings
    }

    pub fn is_opened(&self) -> bool {
        self.inner.state().opened
    }

    /// Allocate every pin and start polling inputs
    ///
    /// Does nothing when already open. When a pin cannot be allocated, the
    /// pins allocated so far are released again.
    pub fn open(&self) -> Result<(), ConnectionError> {
        // Timer lock held until polling runs; order is timer, then pin table
        let mut timer = self.timer();
        {
            let mut state = self.inner.state();
            if state.opened {
                return Ok(());
            }

            let configurations: Vec<PinConfiguration> = state.pins.values().cloned().collect();
            for (index, configuration) in configurations.iter().enumerate() {
                if let Err(e) = self.inner.allocate(&mut state, configuration) {
                    // Already logged per pin; the allocation error wins
                    let _ = self.inner.release_all(&mut state, &configurations[..index]);
                    return Err(e.into());
                }
            }
            state.opened = true;
            debug!("connection opened with {} pins", configurations.len());
        }

        let inner = Arc::downgrade(&self.inner);
        let started = timer.start(
            OPEN_DELAY,
            self.inner.settings.poll_interval,
            Box::new(move || poll(&inner)),
        );
        if let Err(e) = started {
            let mut guard = self.inner.state();
            let state = &mut *guard;
            let configurations: Vec<PinConfiguration> = state.pins.values().cloned().collect();
            let _ = self.inner.release_all(state, &configurations);
            state.opened = false;
            return Err(ConnectionError::Timer(e));
        }
        Ok(())
    }

    /// Stop polling and release every pin
    ///
    /// Outputs are driven low before release. Does nothing when closed.
    pub fn close(&self) -> Result<(), ConnectionError> {
        let mut timer = self.timer();
        if !self.is_opened() {
            return Ok(());
        }
        // A tick may be waiting for the pin table, so stop before locking it
        timer.stop();

        let mut guard = self.inner.state();
        let state = &mut *guard;
        if !state.opened {
            return Ok(());
        }
        let configurations: Vec<PinConfiguration> = state.pins.values().cloned().collect();
        let result = self.inner.release_all(state, &configurations);
        state.opened = false;
        debug!("connection closed");
        result
    }

    /// Add a pin, allocating it immediately when open
    pub fn add(&self, configuration: PinConfiguration) -> Result<(), ConnectionError> {
        let mut guard = self.inner.state();
        let state = &mut *guard;

        let pin = configuration.pin();
        if state.pins.contains_key(&pin) {
            return Err(ConnectionError::DuplicatePin(pin));
        }
        if let Some(name) = configuration.name() {
            if state.names.contains_key(name) {
                return Err(ConnectionError::DuplicateName(name.to_owned()));
            }
        }

        state.values.insert(pin, configuration.initial_value());
        if state.opened {
            if let Err(e) = self.inner.allocate(state, &configuration) {
                state.values.remove(&pin);
                return Err(e.into());
            }
        }

        if let Some(name) = configuration.name() {
            state.names.insert(name.to_owned(), pin);
        }
        state.pins.insert(pin, configuration);
        Ok(())
    }

    /// Remove a pin, releasing it immediately when open
    pub fn remove<'a>(&self, selector: impl Into<PinSelector<'a>>) -> Result<(), ConnectionError> {
        let selector = selector.into();
        let mut guard = self.inner.state();
        let state = &mut *guard;

        let pin = self.inner.resolve(state, selector)?;
        let configuration = state
            .pins
            .get(&pin)
            .cloned()
            .ok_or_else(|| ConnectionError::PinNotFound(selector.to_string()))?;
        // The pin stays configured until the driver has let go of it
        if state.opened {
            self.inner.release(state, &configuration)?;
        }

        state.pins.remove(&pin);
        if let Some(name) = configuration.name() {
            state.names.remove(name);
        }
        state.values.remove(&pin);
        Ok(())
    }

    /// Release and forget every pin; the connection stays open
    pub fn clear(&self) -> Result<(), ConnectionError> {
        let mut guard = self.inner.state();
        let state = &mut *guard;

        let pins = std::mem::take(&mut state.pins);
        state.names.clear();
        state.values.clear();
        let result = if state.opened {
            self.inner.release_all(state, pins.values())
        } else {
            Ok(())
        };
        state.inputs = ProcessorPins::NONE;
        state.raw_inputs = ProcessorPins::NONE;
        result
    }

    pub fn contains<'a>(&self, selector: impl Into<PinSelector<'a>>) -> bool {
        let state = self.inner.state();
        self.inner.resolve(&state, selector.into()).is_ok()
    }

    /// Configuration of a pin
    pub fn configuration<'a>(
        &self,
        selector: impl Into<PinSelector<'a>>,
    ) -> Result<PinConfiguration, ConnectionError> {
        let state = self.inner.state();
        let pin = self.inner.resolve(&state, selector.into())?;
        state
            .pins
            .get(&pin)
            .cloned()
            .ok_or(ConnectionError::PinNotFound(pin.to_string()))
    }

    /// Configurations of every pin, ordered by processor pin
    pub fn pins(&self) -> Vec<PinConfiguration> {
        self.inner.state().pins.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state().pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state().pins.is_empty()
    }

    /// Logical value of a pin
    pub fn get<'a>(&self, selector: impl Into<PinSelector<'a>>) -> Result<bool, ConnectionError> {
        let state = self.inner.state();
        let pin = self.inner.resolve(&state, selector.into())?;
        Ok(state.values.get(&pin).copied().unwrap_or(false))
    }

    /// Set the logical value of an output
    ///
    /// On a closed connection only the cached value changes; it is written
    /// when the connection opens.
    pub fn set<'a>(
        &self,
        selector: impl Into<PinSelector<'a>>,
        value: bool,
    ) -> Result<(), ConnectionError> {
        let notification = {
            let mut guard = self.inner.state();
            let state = &mut *guard;

            let pin = self.inner.resolve(state, selector.into())?;
            let Some(configuration) = state.pins.get(&pin) else {
                return Err(ConnectionError::PinNotFound(pin.to_string()));
            };
            if configuration.direction() != PinDirection::Output {
                return Err(ConnectionError::InvalidOperation {
                    pin,
                    operation: "set",
                });
            }

            if state.opened {
                self.inner.driver.write(pin, configuration.raw_value(value))?;
            }
            let previous = state.values.insert(pin, value);
            (previous != Some(value)).then(|| Notification::new(configuration, value))
        };

        self.inner.dispatch(notification.into_iter().collect());
        Ok(())
    }

    /// Invert the logical value of an output
    pub fn toggle<'a>(&self, selector: impl Into<PinSelector<'a>>) -> Result<(), ConnectionError> {
        let selector = selector.into();
        let value = self.get(selector)?;
        self.set(selector, !value)
    }

    /// Toggle an output, wait, and toggle it back
    ///
    /// A zero `duration` uses the configured blink duration.
    pub fn blink<'a>(
        &self,
        selector: impl Into<PinSelector<'a>>,
        duration: Duration,
    ) -> Result<(), ConnectionError> {
        let selector = selector.into();
        let duration = if duration.is_zero() {
            self.inner.settings.blink_duration
        } else {
            duration
        };
        self.toggle(selector)?;
        thread::sleep(duration);
        self.toggle(selector)
    }

    /// Poll every allocated input once
    ///
    /// Called by the poll timer; exposed so that callers can force a poll.
    pub fn check_input_pins(&self) -> Result<(), ConnectionError> {
        self.inner.check_input_pins()
    }

    /// Register an observer notified of every change
    pub fn subscribe(&self, observer: impl PinObserver + 'static) -> ObserverId {
        let mut observers = self.inner.observers();
        let id = ObserverId(observers.next_id);
        observers.next_id += 1;
        let observer: Arc<dyn PinObserver> = Arc::new(observer);
        observers.observers.push((id, observer));
        id
    }

    /// Remove an observer; returns whether it was registered
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.inner.observers();
        let before = observers.observers.len();
        observers.observers.retain(|(registered, _)| *registered != id);
        observers.observers.len() != before
    }

    /// Channel receiving every change; dropping the receiver unsubscribes
    pub fn events(&self) -> Receiver<PinChange> {
        let (sender, receiver) = mpsc::channel();
        self.inner.observers().channels.push(sender);
        receiver
    }
}

fn poll(inner: &Weak<Inner>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    if let Err(e) = inner.check_input_pins() {
        warn!("input poll failed: {e}");
    }
}

impl fmt::Debug for GpioConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("GpioConnection")
            .field("driver", &self.inner.driver.name())
            .field("opened", &state.opened)
            .field("pins", &state.pins.len())
            .finish()
    }
}

impl Drop for GpioConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing connection: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;
    use proptest::prelude::*;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Timer that never ticks on its own
    #[derive(Default, Clone)]
    struct ManualTimer {
        starts: Arc<AtomicUsize>,
        running: Arc<AtomicBool>,
    }

    impl PeriodicTimer for ManualTimer {
        fn start(&mut self, _delay: Duration, _interval: Duration, _tick: crate::timer::Tick) -> io::Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) {
            self.running.store(false, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    fn connection(
        pins: impl IntoIterator<Item = PinConfiguration>,
    ) -> (Arc<MockDriver>, ManualTimer, GpioConnection) {
        let driver = Arc::new(MockDriver::new());
        let timer = ManualTimer::default();
        let connection = GpioConnection::with_timer(
            driver.clone(),
            GpioConnectionSettings::default(),
            Box::new(timer.clone()),
            pins,
        )
        .unwrap();
        (driver, timer, connection)
    }

    #[test]
    fn test_open_allocates_and_starts_polling() {
        let (driver, timer, connection) = connection([
            PinConfiguration::output(ProcessorPin::P18).enabled(true),
            PinConfiguration::input(ProcessorPin::P17).with_resistor(PinResistor::PullUp),
        ]);

        assert!(connection.is_opened());
        assert!(timer.is_running());
        assert_eq!(driver.direction(ProcessorPin::P18), Some(PinDirection::Output));
        assert_eq!(driver.direction(ProcessorPin::P17), Some(PinDirection::Input));
        assert_eq!(driver.resistor(ProcessorPin::P17), Some(PinResistor::PullUp));
        assert!(driver.level(ProcessorPin::P18));

        // Idempotent
        connection.open().unwrap();
        assert_eq!(timer.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_initial_input_read() {
        let driver = Arc::new(MockDriver::new());
        driver.set_level(ProcessorPin::P17, true);
        let connection = GpioConnection::with_timer(
            driver.clone(),
            GpioConnectionSettings::default(),
            Box::new(ManualTimer::default()),
            [
                PinConfiguration::input(ProcessorPin::P17).named("door"),
                PinConfiguration::input(ProcessorPin::P27).named("window").reversed(true),
            ],
        )
        .unwrap();

        assert!(connection.get("door").unwrap());
        assert!(connection.get("window").unwrap());
    }

    #[test]
    fn test_reversed_output() {
        let (driver, _, connection) =
            connection([PinConfiguration::output(ProcessorPin::P18).named("led").reversed(true)]);

        connection.set("led", true).unwrap();
        assert!(!driver.level(ProcessorPin::P18));
        assert!(connection.get("led").unwrap());

        connection.set("led", false).unwrap();
        assert!(driver.level(ProcessorPin::P18));
        assert!(!connection.get("led").unwrap());
    }

    #[test]
    fn test_setting_an_input_fails() {
        let (_, _, connection) = connection([PinConfiguration::input(ProcessorPin::P17)]);
        assert!(matches!(
            connection.set(ProcessorPin::P17, true),
            Err(ConnectionError::InvalidOperation { operation: "set", .. })
        ));
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let (_, _, connection) =
            connection([PinConfiguration::output(ProcessorPin::P18).named("led")]);

        assert!(matches!(
            connection.add(PinConfiguration::input(ProcessorPin::P18)),
            Err(ConnectionError::DuplicatePin(ProcessorPin::P18))
        ));
        assert!(matches!(
            connection.add(PinConfiguration::input(ProcessorPin::P17).named("led")),
            Err(ConnectionError::DuplicateName(name)) if name == "led"
        ));
        assert_eq!(connection.len(), 1);
    }

    #[test]
    fn test_selectors() {
        let (_, _, connection) =
            connection([PinConfiguration::output(ProcessorPin::P17).named("relay")]);
        let configuration = connection.configuration("relay").unwrap();

        assert!(connection.contains("relay"));
        assert!(connection.contains(ProcessorPin::P17));
        // P1-11 is GPIO17 on the default Rev2 pinout
        assert!(connection.contains(ConnectorPin::p1(11)));
        assert!(connection.contains(&configuration));
        assert!(!connection.contains("pump"));
        assert!(!connection.contains(ConnectorPin::p1(1)));

        connection.set(ConnectorPin::p1(11), true).unwrap();
        assert!(connection.get(&configuration).unwrap());
        assert!(matches!(
            connection.get("pump"),
            Err(ConnectionError::PinNotFound(_))
        ));
    }

    #[test]
    fn test_switch_input_toggles_on_active_edges() {
        let toggles = Arc::new(Mutex::new(Vec::new()));
        let recorded = toggles.clone();
        let (driver, _, connection) = connection([PinConfiguration::switch_input(ProcessorPin::P17)
            .named("button")
            .on_change(move |value| recorded.lock().unwrap().push(value))]);

        for level in [true, false, true] {
            driver.set_level(ProcessorPin::P17, level);
            connection.check_input_pins().unwrap();
        }

        assert_eq!(*toggles.lock().unwrap(), vec![true, false]);
        assert!(!connection.get("button").unwrap());
    }

    #[test]
    fn test_reversed_switch_toggles_on_falling_level() {
        let driver = Arc::new(MockDriver::new());
        driver.set_level(ProcessorPin::P17, true);
        let connection = GpioConnection::with_timer(
            driver.clone(),
            GpioConnectionSettings::default(),
            Box::new(ManualTimer::default()),
            [PinConfiguration::switch_input(ProcessorPin::P17).reversed(true)],
        )
        .unwrap();

        driver.set_level(ProcessorPin::P17, false);
        connection.check_input_pins().unwrap();
        assert!(connection.get(ProcessorPin::P17).unwrap());

        driver.set_level(ProcessorPin::P17, true);
        connection.check_input_pins().unwrap();
        assert!(connection.get(ProcessorPin::P17).unwrap());
    }

    #[test]
    fn test_changes_reach_observers_and_channels() {
        let (driver, _, connection) = connection([
            PinConfiguration::input(ProcessorPin::P17).named("door"),
            PinConfiguration::input(ProcessorPin::P27),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let id = connection.subscribe(move |change: &PinChange| {
            recorded.lock().unwrap().push(change.clone())
        });
        let events = connection.events();

        driver.set_level(ProcessorPin::P17, true);
        driver.set_level(ProcessorPin::P27, true);
        connection.check_input_pins().unwrap();
        assert_eq!(driver.batch_reads(), 1);

        let door = PinChange {
            pin: ProcessorPin::P17,
            name: Some("door".into()),
            value: true,
        };
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(seen.lock().unwrap()[0], door);
        assert_eq!(events.try_recv().unwrap(), door);
        assert_eq!(events.try_recv().unwrap().pin, ProcessorPin::P27);

        // No change, no notification
        connection.check_input_pins().unwrap();
        assert!(events.try_recv().is_err());

        assert!(connection.unsubscribe(id));
        assert!(!connection.unsubscribe(id));
        driver.set_level(ProcessorPin::P17, false);
        connection.check_input_pins().unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(!events.try_recv().unwrap().value);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let (driver, _, connection) = connection([PinConfiguration::input(ProcessorPin::P17)]);
        drop(connection.events());

        driver.set_level(ProcessorPin::P17, true);
        connection.check_input_pins().unwrap();
        assert!(connection.inner.observers().channels.is_empty());
    }

    #[test]
    fn test_output_changes_are_notified() {
        let (_, _, connection) = connection([PinConfiguration::output(ProcessorPin::P18)]);
        let events = connection.events();

        connection.set(ProcessorPin::P18, false).unwrap();
        assert!(events.try_recv().is_err());
        connection.toggle(ProcessorPin::P18).unwrap();
        assert!(events.try_recv().unwrap().value);
    }

    #[test]
    fn test_close_drives_outputs_low_and_releases() {
        let (driver, timer, connection) = connection([
            PinConfiguration::output(ProcessorPin::P18).named("led").reversed(true),
            PinConfiguration::input(ProcessorPin::P17),
        ]);
        connection.set("led", false).unwrap();
        assert!(driver.level(ProcessorPin::P18));

        connection.close().unwrap();
        assert!(!connection.is_opened());
        assert!(!timer.is_running());
        assert!(!driver.level(ProcessorPin::P18));
        assert_eq!(driver.direction(ProcessorPin::P18), None);
        assert_eq!(driver.direction(ProcessorPin::P17), None);

        // Idempotent, and pins stay configured
        connection.close().unwrap();
        assert_eq!(connection.len(), 2);
    }

    #[test]
    fn test_set_while_closed_is_written_on_open() {
        let driver = Arc::new(MockDriver::new());
        let settings = GpioConnectionSettings {
            opened: false,
            ..GpioConnectionSettings::default()
        };
        let connection = GpioConnection::with_timer(
            driver.clone(),
            settings,
            Box::new(ManualTimer::default()),
            [PinConfiguration::output(ProcessorPin::P18)],
        )
        .unwrap();
        assert!(!connection.is_opened());

        connection.set(ProcessorPin::P18, true).unwrap();
        assert!(driver.writes().is_empty());

        connection.open().unwrap();
        assert_eq!(driver.writes(), vec![(ProcessorPin::P18, true)]);
    }

    #[test]
    fn test_add_and_remove_while_open() {
        let (driver, _, connection) = connection(Vec::<PinConfiguration>::new());

        connection
            .add(PinConfiguration::output(ProcessorPin::P22).named("fan"))
            .unwrap();
        assert_eq!(driver.direction(ProcessorPin::P22), Some(PinDirection::Output));

        connection.remove("fan").unwrap();
        assert_eq!(driver.direction(ProcessorPin::P22), None);
        assert!(!connection.contains("fan"));
        assert!(connection.is_empty());
    }

    /// Mock whose next `release` calls fail
    struct StickyDriver {
        inner: Arc<MockDriver>,
        failures: AtomicUsize,
    }

    impl GpioDriver for StickyDriver {
        fn name(&self) -> &'static str {
            "sticky"
        }

        fn capabilities(&self) -> raspio_hal::DriverCapabilities {
            self.inner.capabilities()
        }

        fn allocate(&self, pin: ProcessorPin, direction: PinDirection) -> Result<(), GpioError> {
            self.inner.allocate(pin, direction)
        }

        fn set_pin_resistor(&self, pin: ProcessorPin, resistor: PinResistor) -> Result<(), GpioError> {
            self.inner.set_pin_resistor(pin, resistor)
        }

        fn set_pin_detected_edges(
            &self,
            pin: ProcessorPin,
            edges: raspio_hal::PinDetectedEdges,
        ) -> Result<(), GpioError> {
            self.inner.set_pin_detected_edges(pin, edges)
        }

        fn wait(
            &self,
            pin: ProcessorPin,
            state: bool,
            timeout: Option<Duration>,
        ) -> Result<(), GpioError> {
            self.inner.wait(pin, state, timeout)
        }

        fn write(&self, pin: ProcessorPin, value: bool) -> Result<(), GpioError> {
            self.inner.write(pin, value)
        }

        fn read(&self, pin: ProcessorPin) -> Result<bool, GpioError> {
            self.inner.read(pin)
        }

        fn read_pins(&self, pins: ProcessorPins) -> Result<ProcessorPins, GpioError> {
            self.inner.read_pins(pins)
        }

        fn release(&self, pin: ProcessorPin) -> Result<(), GpioError> {
            let pending = self.failures.load(Ordering::SeqCst);
            if pending > 0 {
                self.failures.store(pending - 1, Ordering::SeqCst);
                return Err(GpioError::NotAllocated(pin));
            }
            self.inner.release(pin)
        }
    }

    #[test]
    fn test_failed_release_keeps_pin_configured() {
        let mock = Arc::new(MockDriver::new());
        let driver = Arc::new(StickyDriver {
            inner: mock.clone(),
            failures: AtomicUsize::new(1),
        });
        let connection = GpioConnection::with_timer(
            driver,
            GpioConnectionSettings::default(),
            Box::new(ManualTimer::default()),
            [
                PinConfiguration::output(ProcessorPin::P18).named("led"),
                PinConfiguration::input(ProcessorPin::P17).named("button"),
            ],
        )
        .unwrap();

        assert!(connection.remove("led").is_err());
        assert!(connection.contains("led"));
        assert_eq!(mock.direction(ProcessorPin::P18), Some(PinDirection::Output));

        // Retrying works once the driver lets go
        connection.remove("led").unwrap();
        assert!(!connection.contains("led"));
        assert_eq!(mock.direction(ProcessorPin::P18), None);
    }

    #[test]
    fn test_failed_release_is_retried_on_close() {
        let mock = Arc::new(MockDriver::new());
        let driver = Arc::new(StickyDriver {
            inner: mock.clone(),
            failures: AtomicUsize::new(1),
        });
        let connection = GpioConnection::with_timer(
            driver,
            GpioConnectionSettings::default(),
            Box::new(ManualTimer::default()),
            [PinConfiguration::input(ProcessorPin::P17).named("button")],
        )
        .unwrap();

        assert!(connection.remove("button").is_err());
        connection.close().unwrap();
        assert_eq!(mock.direction(ProcessorPin::P17), None);
    }

    #[test]
    fn test_open_and_close_race_leaves_timer_consistent() {
        let (_, timer, connection) = connection([PinConfiguration::input(ProcessorPin::P17)]);
        connection.close().unwrap();

        for _ in 0..200 {
            thread::scope(|scope| {
                scope.spawn(|| connection.open().unwrap());
                scope.spawn(|| connection.close().unwrap());
            });
            assert_eq!(connection.is_opened(), timer.is_running());
            connection.close().unwrap();
            assert!(!timer.is_running());
        }
    }

    #[test]
    fn test_failed_allocation_rolls_back() {
        let driver = Arc::new(MockDriver::with_capabilities(
            raspio_hal::DriverCapabilities::NONE,
        ));
        let result = GpioConnection::with_timer(
            driver.clone(),
            GpioConnectionSettings::default(),
            Box::new(ManualTimer::default()),
            [
                PinConfiguration::output(ProcessorPin::P4),
                PinConfiguration::input(ProcessorPin::P17).with_resistor(PinResistor::PullDown),
            ],
        );

        assert!(matches!(
            result,
            Err(ConnectionError::Gpio(GpioError::Unsupported { .. }))
        ));
        assert_eq!(driver.direction(ProcessorPin::P4), None);
        assert_eq!(driver.direction(ProcessorPin::P17), None);
    }

    #[test]
    fn test_clear_forgets_every_pin() {
        let (driver, _, connection) = connection([
            PinConfiguration::output(ProcessorPin::P18).named("led"),
            PinConfiguration::input(ProcessorPin::P17),
        ]);

        connection.clear().unwrap();
        assert!(connection.is_empty());
        assert!(connection.is_opened());
        assert!(!connection.contains("led"));
        assert_eq!(driver.direction(ProcessorPin::P18), None);

        // Names are free again
        connection
            .add(PinConfiguration::output(ProcessorPin::P23).named("led"))
            .unwrap();
    }

    #[test]
    fn test_blink_restores_value() {
        let (driver, _, connection) = connection([PinConfiguration::output(ProcessorPin::P18)]);

        connection
            .blink(ProcessorPin::P18, Duration::from_millis(1))
            .unwrap();
        assert_eq!(driver.writes_to(ProcessorPin::P18), vec![false, true, false]);
        assert!(!connection.get(ProcessorPin::P18).unwrap());
    }

    #[test]
    fn test_callback_may_use_the_connection() {
        let (driver, _, connection) = connection([
            PinConfiguration::input(ProcessorPin::P17).named("button"),
            PinConfiguration::output(ProcessorPin::P18).named("led"),
        ]);
        let connection = Arc::new(connection);

        let target = Arc::downgrade(&connection);
        connection.subscribe(move |change: &PinChange| {
            if change.pin == ProcessorPin::P17 {
                if let Some(connection) = target.upgrade() {
                    connection.set("led", change.value).unwrap();
                }
            }
        });

        driver.set_level(ProcessorPin::P17, true);
        connection.check_input_pins().unwrap();
        assert!(driver.level(ProcessorPin::P18));
    }

    #[test]
    fn test_timer_polls_inputs() {
        let driver = Arc::new(MockDriver::new());
        let settings = GpioConnectionSettings {
            poll_interval: Duration::from_millis(5),
            ..GpioConnectionSettings::default()
        };
        let connection = GpioConnection::new(
            driver.clone(),
            settings,
            [PinConfiguration::input(ProcessorPin::P17)],
        )
        .unwrap();
        let events = connection.events();

        driver.set_level(ProcessorPin::P17, true);
        let change = events.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(change.value);

        connection.close().unwrap();
        assert!(driver.batch_reads() > 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8, Option<u8>),
        Remove(u8),
        RemoveName(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8, proptest::option::of(0u8..4)).prop_map(|(pin, name)| Op::Add(pin, name)),
            (0u8..8).prop_map(Op::Remove),
            (0u8..4).prop_map(Op::RemoveName),
        ]
    }

    fn check_indexes(connection: &GpioConnection) {
        let state = connection.inner.state();
        for (name, pin) in &state.names {
            let configuration = state.pins.get(pin).expect("name points to a missing pin");
            assert_eq!(configuration.name(), Some(name.as_str()));
        }
        let named = state.pins.values().filter(|c| c.name().is_some()).count();
        assert_eq!(named, state.names.len());
        for (pin, configuration) in &state.pins {
            assert_eq!(*pin, configuration.pin());
            assert!(state.values.contains_key(pin));
        }
        assert_eq!(state.values.len(), state.pins.len());
    }

    proptest! {
        #[test]
        fn prop_name_and_pin_indexes_stay_consistent(ops in proptest::collection::vec(op(), 1..40)) {
            let (_, _, connection) = connection(Vec::<PinConfiguration>::new());
            for op in ops {
                match op {
                    Op::Add(pin, name) => {
                        let pin = ProcessorPin::new(pin).unwrap();
                        let mut configuration = PinConfiguration::output(pin);
                        if let Some(name) = name {
                            configuration = configuration.named(format!("pin-{name}"));
                        }
                        let _ = connection.add(configuration);
                    }
                    Op::Remove(pin) => {
                        let _ = connection.remove(ProcessorPin::new(pin).unwrap());
                    }
                    Op::RemoveName(name) => {
                        let _ = connection.remove(format!("pin-{name}").as_str());
                    }
                }
                check_indexes(&connection);
            }
        }
    }
}
