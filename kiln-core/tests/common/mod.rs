#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use kiln_core::process::{CommandSpec, ProcessOutput, ProcessRunner};
use kiln_core::Result;

pub const FAKE_PID: u32 = 4242;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(String),
    End(String),
}

/// Fake process runner that records start/end order instead of running
/// anything. Labels are action names.
#[derive(Default)]
pub struct RecordingRunner {
    events: Mutex<Vec<Event>>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    writes: HashMap<String, Vec<(PathBuf, String)>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(mut self, label: &str) -> Self {
        self.failing.insert(label.to_string());
        self
    }

    pub fn delay(mut self, label: &str, millis: u64) -> Self {
        self.delays
            .insert(label.to_string(), Duration::from_millis(millis));
        self
    }

    /// Writes `contents` to `path` whenever `label` runs successfully.
    pub fn writes(mut self, label: &str, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.writes
            .entry(label.to_string())
            .or_default()
            .push((path.into(), contents.to_string()));
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn calls(&self, label: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == Event::Start(label.to_string()))
            .count()
    }

    pub fn position(&self, event: Event) -> Option<usize> {
        self.events().iter().position(|e| *e == event)
    }

    pub fn started(&self, label: &str) -> Option<usize> {
        self.position(Event::Start(label.to_string()))
    }

    pub fn ended(&self, label: &str) -> Option<usize> {
        self.position(Event::End(label.to_string()))
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Start(spec.label.clone()));

        if let Some(delay) = self.delays.get(&spec.label) {
            thread::sleep(*delay);
        }

        let failed = self.failing.contains(&spec.label);
        if !failed {
            for (path, contents) in self.writes.get(&spec.label).into_iter().flatten() {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(path, contents).unwrap();
            }
        }

        self.events
            .lock()
            .unwrap()
            .push(Event::End(spec.label.clone()));

        if failed {
            Ok(ProcessOutput::failure(1, format!("{} failed", spec.label)))
        } else {
            Ok(ProcessOutput::success())
        }
    }

    fn spawn_detached(&self, spec: &CommandSpec) -> Result<u32> {
        let mut events = self.events.lock().unwrap();
        events.push(Event::Start(spec.label.clone()));
        events.push(Event::End(spec.label.clone()));
        Ok(FAKE_PID)
    }
}
