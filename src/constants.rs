pub const LOCAL_HOST: &str = "127.0.0.1";
pub const ALL_HOST: &str = "0.0.0.0";
pub const TERMINATOR: &[u8; 2] = b"\r\n";

// Maximum number of pending events per subscriber. The oldest event is
// dropped when the queue is full.
pub const BOUND_EVENT_QUEUE: usize = 100;

// Test status values reported by the controller. The test is active in the
// inclusive range.
pub const TEST_STATUS_ACTIVE_MIN: i16 = 2;
pub const TEST_STATUS_ACTIVE_MAX: i16 = 5;

// Test status published while the controller is not reachable.
pub const TEST_STATUS_UNKNOWN: i16 = -1;

// Fallback test speed in mm/min.
pub const DEFAULT_TEST_SPEED: f64 = 12.0;

// Fallback jog velocity in mm/s.
pub const DEFAULT_JOG_VELOCITY: f64 = 50.0;

pub const SECOND_PER_MINUTE: f64 = 60.0;
