use super::Event;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;

lazy_static! {
    static ref EVENT_LOGS: Mutex<HashMap<&'static str, Vec<Event>>> = Mutex::new(HashMap::new());
}

/// Clears the log for `name`. Each test should use its own name, since tests run in parallel.
pub fn reset_events(name: &'static str) {
    let mut map = EVENT_LOGS.lock().unwrap();
    map.insert(name, Vec::new());
}

pub fn push_event(name: &'static str, event: Event) {
    let mut map = EVENT_LOGS.lock().unwrap();
    map.entry(name).or_default().push(event);
}

/// Returns everything logged under `name` so far, and clears the log.
pub fn take_events(name: &'static str) -> Vec<Event> {
    let mut map = EVENT_LOGS.lock().unwrap();
    map.insert(name, Vec::new()).unwrap_or_default()
}
