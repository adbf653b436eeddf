// src/telemetry.rs
//
// Debug recorder for protocol transitions (parks, hand-offs, relays).
// Compiled in with the `telemetry` feature; every function is an inlined
// no-op otherwise.

#[cfg(feature = "telemetry")]
pub mod enabled {
  use std::collections::HashMap;
  use std::fmt;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::thread::{self, ThreadId};
  use std::time::Instant;

  use parking_lot::Mutex;
  use tokio::task::Id as TokioTaskId;

  static NEXT_EVENT_SEQUENCE_ID: AtomicUsize = AtomicUsize::new(0);

  #[derive(Clone)]
  pub struct TelemetryEvent {
    pub seq_id: usize,
    pub timestamp: Instant,
    pub os_thread_id: ThreadId,
    pub tokio_task_id: Option<TokioTaskId>,
    pub location: String,   // e.g. "AsyncCircularBuffer::enqueue"
    pub event_type: String, // e.g. "Parked", "HandOff"
    pub message: Option<String>,
  }

  impl fmt::Debug for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("TelemetryEvent")
        .field("seq", &self.seq_id)
        .field("os_tid", &self.os_thread_id)
        .field("tokio_tid", &self.tokio_task_id.map(|id| id.to_string()).as_deref().unwrap_or("N/A"))
        .field("loc", &self.location)
        .field("evt", &self.event_type)
        .field("msg", &self.message.as_deref().unwrap_or(""))
        .finish()
    }
  }

  type CounterKey = (String, String); // (location, counter_name)

  struct CollectorData {
    events: Vec<TelemetryEvent>,
    counters: HashMap<CounterKey, usize>,
    start_time: Instant,
  }

  impl CollectorData {
    fn new() -> Self {
      CollectorData {
        events: Vec::new(),
        counters: HashMap::new(),
        start_time: Instant::now(),
      }
    }
  }

  lazy_static::lazy_static! {
      static ref GLOBAL_COLLECTOR: Mutex<CollectorData> = Mutex::new(CollectorData::new());
  }

  pub fn log_event_fn(location: &str, event_type: &str, message: Option<String>) {
    let event = TelemetryEvent {
      seq_id: NEXT_EVENT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed),
      timestamp: Instant::now(),
      os_thread_id: thread::current().id(),
      tokio_task_id: tokio::task::try_id(),
      location: location.to_string(),
      event_type: event_type.to_string(),
      message,
    };
    GLOBAL_COLLECTOR.lock().events.push(event);
  }

  pub fn increment_counter_fn(location: &str, counter_name: &str) {
    let key = (location.to_string(), counter_name.to_string());
    *GLOBAL_COLLECTOR.lock().counters.entry(key).or_insert(0) += 1;
  }

  pub fn counter_value_fn(location: &str, counter_name: &str) -> usize {
    let key = (location.to_string(), counter_name.to_string());
    GLOBAL_COLLECTOR.lock().counters.get(&key).copied().unwrap_or(0)
  }

  pub fn recorded_events_fn() -> Vec<TelemetryEvent> {
    let mut events = GLOBAL_COLLECTOR.lock().events.clone();
    events.sort_by_key(|e| e.seq_id);
    events
  }

  pub fn print_telemetry_report_fn() {
    let collector = GLOBAL_COLLECTOR.lock();
    println!("\n--- gated_ring Telemetry Report ---");
    println!("Collection started at: {:?}", collector.start_time);

    if collector.events.is_empty() {
      println!("\n[Events] No detailed events recorded.");
    } else {
      println!("\n[Events] Recorded Events ({}):", collector.events.len());
      let mut sorted_events = collector.events.clone();
      sorted_events.sort_by_key(|e| e.seq_id);

      for event in sorted_events.iter() {
        let time_since_start = event.timestamp.duration_since(collector.start_time);
        let tokio_tid_str = event.tokio_task_id.map(|id| id.to_string()).unwrap_or_else(|| "---".to_string());
        println!(
          "  +{:<10.6}s [Seq:{:<5}] OS_TID:{:<12?} TaskID:{:<6} Loc:{:<32} Evt:{:<12} Msg: {}",
          time_since_start.as_secs_f64(),
          event.seq_id,
          event.os_thread_id,
          tokio_tid_str,
          event.location,
          event.event_type,
          event.message.as_deref().unwrap_or("")
        );
      }
    }

    if collector.counters.is_empty() {
      println!("\n[Counters] No counters recorded.");
    } else {
      println!("\n[Counters] Recorded Counters ({}):", collector.counters.len());
      let mut sorted_counters: Vec<_> = collector.counters.iter().collect();
      sorted_counters.sort_by_key(|(k, _v)| *k);
      for ((loc, name), count) in sorted_counters {
        println!("  Loc:{:<32} Counter:{:<12} Value: {}", loc, name, count);
      }
    }
    println!("\n--- End of Telemetry Report ---");
  }

  pub fn clear_telemetry_fn() {
    let mut collector = GLOBAL_COLLECTOR.lock();
    collector.events.clear();
    collector.counters.clear();
    collector.start_time = Instant::now();
    NEXT_EVENT_SEQUENCE_ID.store(0, Ordering::Relaxed);
  }
} // mod enabled

#[cfg(not(feature = "telemetry"))]
pub mod disabled {
  #[inline(always)]
  pub fn log_event_fn(_location: &'static str, _event_type: &'static str, _message: Option<String>) {}
  #[inline(always)]
  pub fn increment_counter_fn(_location: &'static str, _counter_name: &'static str) {}
  #[inline(always)]
  pub fn counter_value_fn(_location: &'static str, _counter_name: &'static str) -> usize {
    0
  }
  #[inline(always)]
  pub fn print_telemetry_report_fn() {}
  #[inline(always)]
  pub fn clear_telemetry_fn() {}
}

// Re-export the correct set of functions based on the feature flag
#[cfg(feature = "telemetry")]
pub use enabled::{
  clear_telemetry_fn as clear_telemetry, counter_value_fn as counter_value,
  increment_counter_fn as increment_counter, log_event_fn as log_event,
  print_telemetry_report_fn as print_telemetry_report, recorded_events_fn as recorded_events,
  TelemetryEvent,
};

#[cfg(not(feature = "telemetry"))]
pub use disabled::{
  clear_telemetry_fn as clear_telemetry, counter_value_fn as counter_value,
  increment_counter_fn as increment_counter, log_event_fn as log_event,
  print_telemetry_report_fn as print_telemetry_report,
};
