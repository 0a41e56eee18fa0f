//! Synchronization primitives.
//!
//! The frame engine's timeline maps onto a single timeline semaphore; binary
//! semaphores only order acquire, render and present on the GPU.

use crate::backend::WaitStatus;
use crate::error::Result;
use ash::vk;
use lockstep_core::TimelineValue;
use std::time::Duration;

/// Create a binary semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    Ok(unsafe { device.create_semaphore(&create_info, None) }?)
}

/// Create a timeline semaphore starting at zero.
///
/// # Safety
/// The device must be valid and have the timeline semaphore feature enabled.
pub unsafe fn create_timeline_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let mut type_info = vk::SemaphoreTypeCreateInfo::default()
        .semaphore_type(vk::SemaphoreType::TIMELINE)
        .initial_value(0);
    let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
    Ok(unsafe { device.create_semaphore(&create_info, None) }?)
}

/// Enqueue a signal of `timeline` to `value` after all prior work on `queue`.
///
/// # Safety
/// All handles must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn signal_timeline(
    device: &ash::Device,
    queue: vk::Queue,
    timeline: vk::Semaphore,
    value: TimelineValue,
) -> Result<()> {
    let semaphores = [timeline];
    let values = [value.get()];
    let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&values);
    let submit_info = vk::SubmitInfo::default()
        .signal_semaphores(&semaphores)
        .push_next(&mut timeline_info);

    unsafe { device.queue_submit(queue, &[submit_info], vk::Fence::null()) }?;
    Ok(())
}

/// Current counter value of a timeline semaphore.
///
/// # Safety
/// The device and semaphore must be valid.
pub unsafe fn timeline_value(device: &ash::Device, timeline: vk::Semaphore) -> Result<TimelineValue> {
    let value = unsafe { device.get_semaphore_counter_value(timeline) }?;
    Ok(TimelineValue::new(value))
}

/// Block until `timeline` reaches `value`, for at most `timeout`.
///
/// # Safety
/// The device and semaphore must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_timeline(
    device: &ash::Device,
    timeline: vk::Semaphore,
    value: TimelineValue,
    timeout: Duration,
) -> Result<WaitStatus> {
    let semaphores = [timeline];
    let values = [value.get()];
    let wait_info = vk::SemaphoreWaitInfo::default()
        .semaphores(&semaphores)
        .values(&values);

    match unsafe { device.wait_semaphores(&wait_info, timeout_ns(timeout)) } {
        Ok(()) => Ok(WaitStatus::Ready),
        Err(vk::Result::TIMEOUT) => Ok(WaitStatus::TimedOut),
        Err(e) => Err(e.into()),
    }
}

/// Convert a wait budget to the nanosecond timeout Vulkan expects.
///
/// Budgets that do not fit saturate to `u64::MAX`, which waits forever.
#[must_use]
pub fn timeout_ns(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_conversion_saturates() {
        assert_eq!(timeout_ns(Duration::from_millis(2)), 2_000_000);
        assert_eq!(timeout_ns(Duration::ZERO), 0);
        assert_eq!(timeout_ns(Duration::MAX), u64::MAX);
    }
}
