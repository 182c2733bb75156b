// THEORY:
// The `incident` module is the behavioural layer of the engine. The change
// detector says, frame by frame, whether something moved; this module decides
// what that *means* over time: when an incident starts, when it is over, and
// when the operator should be told about it.
//
// A raw per-frame boolean is noisy. A bird crossing the frame produces two or
// three "motion" frames; a person standing still at the door produces a few
// "no motion" frames in the middle of an incident. The machine smooths this
// with two streak counters and a clock:
//
// 1.  **Start hysteresis**: `motion_streak` counts consecutive accepted motion
//     frames. Recording begins only once it reaches `min_motion_frames`.
// 2.  **Stop hysteresis**: `no_motion_streak` counts consecutive still frames.
//     Recording ends only once it reaches `min_no_motion_frames`. It is a
//     `SaturatingCounter`, so a quiet night does not count to infinity.
// 3.  **Debounce**: a motion frame is "accepted" (advances the streak) only if
//     at least `min_upload_seconds` whole seconds have passed since the last
//     incident timestamp. That timestamp moves forward only on frames that
//     meet the streak threshold. Motion frames that arrive too soon still
//     hold `no_motion_streak` at zero, so a long incident keeps recording
//     without restarting its own clock every frame.
//
// Lifecycle events come out in a fixed order within a tick:
//     begin tick: BeginRecording, Frame
//     stop tick:  Frame, EndRecording, Notify
// so every frame of an incident, the stopping frame included, is handed to the
// sink before the sink is told to finalise.
//
// The machine is generic over the frame payload `F`. The pipeline drives it
// with full `Frame`s; tests drive it with plain integers.

use crate::core_modules::frame::Timestamp;
use crate::core_modules::streak::SaturatingCounter;
use crate::error::{Result, VisionError};

pub const DEFAULT_NO_MOTION_CEILING: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncidentConfig {
    /// Minimum whole seconds between accepted incident frames.
    pub min_upload_seconds: i64,
    /// Consecutive accepted motion frames needed to start recording.
    pub min_motion_frames: u32,
    /// Consecutive still frames needed to stop recording.
    pub min_no_motion_frames: u32,
    /// Emit a `Notify` when an incident ends.
    pub send_email: bool,
    /// Cap for the still-frame counter.
    pub no_motion_ceiling: u32,
}

impl IncidentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_upload_seconds <= 0 {
            return Err(VisionError::Configuration(format!(
                "min_upload_seconds must be positive, got {}",
                self.min_upload_seconds
            )));
        }
        if self.min_motion_frames == 0 {
            return Err(VisionError::Configuration(
                "min_motion_frames must be positive".to_string(),
            ));
        }
        if self.min_no_motion_frames == 0 {
            return Err(VisionError::Configuration(
                "min_no_motion_frames must be positive".to_string(),
            ));
        }
        if self.no_motion_ceiling <= self.min_no_motion_frames {
            return Err(VisionError::Configuration(format!(
                "no_motion_ceiling ({}) must exceed min_no_motion_frames ({})",
                self.no_motion_ceiling, self.min_no_motion_frames
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentPhase {
    Idle,
    Recording,
}

/// What the sinks should do after a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum IncidentEvent<F> {
    BeginRecording { started_at: Timestamp },
    Frame(F),
    EndRecording { ended_at: Timestamp },
    Notify { snapshot: F },
}

/// The mutable state carried from one frame to the next.
#[derive(Debug, Clone)]
pub struct IncidentState<F> {
    phase: IncidentPhase,
    motion_streak: u32,
    no_motion_streak: SaturatingCounter,
    last_incident: Option<Timestamp>,
    first_frame: Option<F>,
}

impl<F> IncidentState<F> {
    fn new(config: &IncidentConfig) -> Self {
        Self {
            phase: IncidentPhase::Idle,
            motion_streak: 0,
            no_motion_streak: SaturatingCounter::new(
                config.no_motion_ceiling,
                config.min_no_motion_frames + 1,
            ),
            last_incident: None,
            first_frame: None,
        }
    }

    pub fn phase(&self) -> IncidentPhase {
        self.phase
    }

    pub fn is_recording(&self) -> bool {
        self.phase == IncidentPhase::Recording
    }

    pub fn motion_streak(&self) -> u32 {
        self.motion_streak
    }

    pub fn no_motion_streak(&self) -> u32 {
        self.no_motion_streak.get()
    }

    pub fn last_incident(&self) -> Option<Timestamp> {
        self.last_incident
    }

    pub fn first_frame(&self) -> Option<&F> {
        self.first_frame.as_ref()
    }
}

pub struct IncidentMachine<F> {
    config: IncidentConfig,
    state: IncidentState<F>,
}

impl<F: Clone> IncidentMachine<F> {
    pub fn new(config: IncidentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: IncidentState::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &IncidentConfig {
        &self.config
    }

    pub fn state(&self) -> &IncidentState<F> {
        &self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    /// Advances the machine by one frame.
    pub fn step(&mut self, motion: bool, timestamp: Timestamp, frame: F) -> Vec<IncidentEvent<F>> {
        let mut events = Vec::new();
        let mut stopping = false;

        if motion {
            self.state.no_motion_streak.reset();

            if self.debounce_elapsed(timestamp) {
                self.state.motion_streak = self.state.motion_streak.saturating_add(1);

                if self.state.motion_streak >= self.config.min_motion_frames {
                    if self.state.phase == IncidentPhase::Idle {
                        log::info!("motion incident started at {timestamp}");
                        self.state.first_frame = Some(frame.clone());
                        self.state.phase = IncidentPhase::Recording;
                        events.push(IncidentEvent::BeginRecording {
                            started_at: timestamp,
                        });
                    }
                    self.state.last_incident = Some(timestamp);
                }
            }
        } else {
            self.state.motion_streak = 0;
            let quiet = self.state.no_motion_streak.increment();
            stopping = self.state.is_recording() && quiet >= self.config.min_no_motion_frames;
        }

        if self.state.is_recording() {
            events.push(IncidentEvent::Frame(frame));
        }
        if stopping {
            events.extend(self.close(timestamp));
        }

        events
    }

    /// Closes an in-progress incident when the stream stops. Does nothing
    /// while idle.
    pub fn finish(&mut self, timestamp: Timestamp) -> Vec<IncidentEvent<F>> {
        if self.state.is_recording() {
            log::info!("stream stopped during an incident, closing it");
            self.close(timestamp)
        } else {
            Vec::new()
        }
    }

    fn debounce_elapsed(&self, timestamp: Timestamp) -> bool {
        match self.state.last_incident {
            Some(last) => (timestamp - last).num_seconds() >= self.config.min_upload_seconds,
            None => true,
        }
    }

    fn close(&mut self, timestamp: Timestamp) -> Vec<IncidentEvent<F>> {
        self.state.phase = IncidentPhase::Idle;
        log::info!("motion incident ended at {timestamp}");

        let mut events = vec![IncidentEvent::EndRecording {
            ended_at: timestamp,
        }];
        let snapshot = self.state.first_frame.take();
        if self.config.send_email {
            if let Some(snapshot) = snapshot {
                events.push(IncidentEvent::Notify { snapshot });
            }
        }
        events
    }
}
