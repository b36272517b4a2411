//! Alarm actuators

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dms::AlarmTransition;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Command sent to an alarm device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmCommand {
    Start,
    Stop,
}

/// Something that can start and stop the alarm sound.
///
/// Both calls must return immediately; any device work happens elsewhere.
pub trait AlertActuator: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

impl<A: AlertActuator + ?Sized> AlertActuator for Box<A> {
    fn start(&self) {
        (**self).start()
    }

    fn stop(&self) {
        (**self).stop()
    }
}

/// Routes state machine transitions to an actuator
pub struct AlertDispatcher<A> {
    actuator: A,
    alarms_started: u64,
}

impl<A: AlertActuator> AlertDispatcher<A> {
    pub fn new(actuator: A) -> Self {
        Self {
            actuator,
            alarms_started: 0,
        }
    }

    /// Forward a transition; `Unchanged` is ignored
    pub fn dispatch(&mut self, transition: AlarmTransition) {
        match transition {
            AlarmTransition::Started => {
                self.alarms_started += 1;
                self.actuator.start();
            }
            AlarmTransition::Stopped => self.actuator.stop(),
            AlarmTransition::Unchanged => {}
        }
    }

    /// Alarms started since creation
    pub fn alarms_started(&self) -> u64 {
        self.alarms_started
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn into_inner(self) -> A {
        self.actuator
    }
}

/// Alarm sound configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Play the alarm sound (log only when disabled)
    pub enabled: bool,
    /// Gap between repeated tones while the alarm is on (ms)
    pub repeat_interval_ms: u64,
    /// WAV file played as the alarm tone; the terminal bell when unset
    pub sound_path: Option<PathBuf>,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repeat_interval_ms: 500,
            sound_path: None,
        }
    }
}

/// Device that can emit one alarm tone.
///
/// `play_tone` may block until the tone has finished; the alarm worker runs
/// it on the blocking pool.
pub trait ToneOutput: Send + 'static {
    fn play_tone(&mut self) -> std::io::Result<()>;
}

impl<T: ToneOutput + ?Sized> ToneOutput for Box<T> {
    fn play_tone(&mut self) -> std::io::Result<()> {
        (**self).play_tone()
    }
}

/// Rings the terminal bell on stderr
pub struct TerminalBell;

impl ToneOutput for TerminalBell {
    fn play_tone(&mut self) -> std::io::Result<()> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()
    }
}

/// Looping alarm sound driven by a background task.
///
/// `start`/`stop` only post a command to the worker, so the frame loop never
/// waits on the sound device. Repeated commands are no-ops.
pub struct AudioAlarm {
    commands: mpsc::UnboundedSender<AlarmCommand>,
    worker: JoinHandle<()>,
}

impl AudioAlarm {
    /// Spawn the alarm worker on the current tokio runtime
    pub fn spawn<T: ToneOutput>(config: &AlarmConfig, output: T) -> Self {
        let interval = Duration::from_millis(config.repeat_interval_ms.max(1));
        let (tx, rx) = mpsc::unbounded_channel();
        info!("Starting alarm worker (repeat every {:?})", interval);
        let worker = tokio::spawn(run_worker(rx, output, interval));
        Self {
            commands: tx,
            worker,
        }
    }

    fn send(&self, command: AlarmCommand) {
        if self.commands.send(command).is_err() {
            debug!("Alarm worker gone, dropping {:?}", command);
        }
    }

    /// Silence the alarm and wait for the worker to exit
    pub async fn shutdown(self) {
        self.send(AlarmCommand::Stop);
        drop(self.commands);
        if let Err(e) = self.worker.await {
            warn!("Alarm worker ended abnormally: {}", e);
        }
    }
}

impl AlertActuator for AudioAlarm {
    fn start(&self) {
        self.send(AlarmCommand::Start);
    }

    fn stop(&self) {
        self.send(AlarmCommand::Stop);
    }
}

async fn run_worker<T: ToneOutput>(
    mut commands: mpsc::UnboundedReceiver<AlarmCommand>,
    output: T,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut playing = false;
    let mut output = Some(output);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(AlarmCommand::Start) if !playing => {
                    info!("Alarm sound on");
                    playing = true;
                    ticker.reset_immediately();
                }
                Some(AlarmCommand::Stop) if playing => {
                    info!("Alarm sound off");
                    playing = false;
                }
                Some(_) => {}
                None => break,
            },
            _ = ticker.tick(), if playing && output.is_some() => {
                output = match output.take() {
                    Some(tone) => play_tone_blocking(tone).await,
                    None => None,
                };
            }
        }
    }

    debug!("Alarm worker stopped");
}

/// Play one tone off the async threads; `None` if the output panicked
async fn play_tone_blocking<T: ToneOutput>(mut output: T) -> Option<T> {
    let played = tokio::task::spawn_blocking(move || {
        let result = output.play_tone();
        (output, result)
    })
    .await;

    match played {
        Ok((output, Ok(()))) => Some(output),
        Ok((output, Err(e))) => {
            warn!("Failed to play alarm tone: {}", e);
            Some(output)
        }
        Err(e) => {
            warn!("Alarm tone output lost: {}", e);
            None
        }
    }
}

/// Logs transitions without any sound
#[derive(Debug, Default)]
pub struct LogActuator;

impl AlertActuator for LogActuator {
    fn start(&self) {
        warn!("DROWSINESS ALERT!");
    }

    fn stop(&self) {
        info!("Drowsiness alert cleared");
    }
}

/// Records every command it receives; clones share the log
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    calls: Arc<Mutex<Vec<AlarmCommand>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AlarmCommand> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, command: AlarmCommand) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command);
        }
    }
}

impl AlertActuator for RecordingActuator {
    fn start(&self) {
        self.record(AlarmCommand::Start);
    }

    fn stop(&self) {
        self.record(AlarmCommand::Stop);
    }
}
