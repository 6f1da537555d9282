//=========================================================================
// Timer Scheduling
//=========================================================================
//
// Periodic callbacks driven once per frame.
//
// Architecture:
//   any thread ── schedule_locked / unschedule_locked ──► pending buckets
//   update thread ── tick(delta) ──► merge ──► fire(delta * time_scale)
//
//=========================================================================

//=== Module Declarations =================================================

mod timer_scheduler;
mod timer;

//=== Public API ==========================================================

pub use timer_scheduler::Scheduler;
pub use timer::{Timer, TimerCallback, TimerMode};
