//! Event assembly for a ready trigger request.

use std::collections::BTreeMap;

use contracts::{ReadoutError, ReadoutEvent, TimeWindow};
use tracing::instrument;

use crate::registry::StreamDescriptor;
use crate::scheduler::TriggerRequest;
use crate::SimulationContext;

/// Default readout window of a trigger:
/// `[trigger_time - offset, trigger_time - offset + readout_window)`
pub fn default_window(ctx: &SimulationContext, trigger_time: f64) -> TimeWindow {
    let settings = ctx.settings();
    let start = trigger_time - settings.trigger_offset;
    TimeWindow::new(start, start + settings.readout_window)
}

/// A stream's own window, falling back to the default bound where unset
pub fn stream_window(
    descriptor: &StreamDescriptor,
    trigger_time: f64,
    default: TimeWindow,
) -> TimeWindow {
    TimeWindow::new(
        descriptor
            .window_before
            .map_or(default.start, |before| trigger_time - before),
        descriptor
            .window_after
            .map_or(default.end, |after| trigger_time + after),
    )
}

/// Build the event for `request` from every persistent stream.
///
/// On-trigger contributions of the drivers are merged in by the caller.
#[instrument(
    name = "readout_assemble",
    level = "debug",
    skip(ctx),
    fields(now = ctx.current_time())
)]
pub(crate) fn assemble(
    ctx: &SimulationContext,
    request: &TriggerRequest,
) -> Result<ReadoutEvent, ReadoutError> {
    let registry = ctx.registry();
    let trigger = registry.trigger(request.source)?;
    let trigger_time = request.trigger_time;
    let bunch = ctx.settings().beam_bunch;
    let window = default_window(ctx, trigger_time);

    let elapsed_bunches = ((ctx.current_time() - trigger_time) / bunch).floor() as i64;
    let mut event = ReadoutEvent {
        event_number: ctx.step_index() as i64 - elapsed_bunches,
        trigger_time,
        sim_trigger_time: trigger_time + trigger.displacement,
        timestamp: (4.0 * (trigger_time / 4.0).round()) as i64,
        trigger_source: trigger.name.clone(),
        window,
        collections: BTreeMap::new(),
    };

    for entry in registry.streams().filter(|e| e.descriptor.persistent) {
        let descriptor = &entry.descriptor;
        let bounds = stream_window(descriptor, trigger_time, window);
        let collection = entry
            .buffer
            .window_collection(&descriptor.name, bounds.start, bounds.end)
            .with_flags(descriptor.flags)
            .with_readout_name(descriptor.readout_name.clone());
        event.insert_collection(collection)?;
    }

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DriverSpec;

    fn setup() -> SimulationContext {
        let mut ctx = SimulationContext::default();
        let id = ctx
            .register_driver(DriverSpec::new("src").displaced_by(4.0))
            .unwrap();
        ctx.register_collection::<i64>("Narrow", id, 0x10, Some("NarrowReadout"), true)
            .unwrap();
        ctx.register_collection::<i64>("Wide", id, 0, None, true)
            .unwrap();
        ctx.register_collection::<i64>("Transient", id, 0, None, false)
            .unwrap();
        ctx.set_window_before("Narrow", 5.0).unwrap();
        ctx.set_window_after("Narrow", 5.0).unwrap();

        for t in -60..160 {
            let stamped = vec![i64::from(t)];
            ctx.add_data("Narrow", Some(f64::from(t)), stamped.clone()).unwrap();
            ctx.add_data("Wide", Some(f64::from(t)), stamped.clone()).unwrap();
            ctx.add_data("Transient", Some(f64::from(t)), stamped).unwrap();
        }
        ctx
    }

    fn request(trigger_time: f64) -> TriggerRequest {
        TriggerRequest {
            trigger_time,
            write_ready_time: trigger_time + 150.0,
            source: crate::TriggerId(0),
        }
    }

    #[test]
    fn test_windows_respect_stream_bounds() {
        let mut ctx = setup();
        ctx.register_trigger(DriverSpec::new("trig"), 0).unwrap();

        let event = assemble(&ctx, &request(10.0)).unwrap();

        let narrow = event.items::<i64>("Narrow").unwrap();
        assert_eq!(narrow.first(), Some(&5));
        assert_eq!(narrow.last(), Some(&14));
        assert!(narrow.iter().all(|&t| (5..15).contains(&t)));

        let wide = event.items::<i64>("Wide").unwrap();
        assert_eq!(wide.first(), Some(&-40));
        assert_eq!(wide.last(), Some(&159));

        assert!(event.collection("Transient").is_none());
    }

    #[test]
    fn test_definition_carried_into_event() {
        let mut ctx = setup();
        ctx.register_trigger(DriverSpec::new("trig"), 0).unwrap();

        let event = assemble(&ctx, &request(10.0)).unwrap();
        let narrow = event.collection("Narrow").unwrap();
        assert_eq!(narrow.flags(), 0x10);
        assert_eq!(narrow.readout_name(), Some("NarrowReadout"));
    }

    #[test]
    fn test_event_metadata() {
        let mut ctx = setup();
        ctx.register_trigger(DriverSpec::new("trig").depends_on("Wide").displaced_by(2.0), 0)
            .unwrap();
        for _ in 0..20 {
            ctx.advance_clock();
        }
        // now = 40, step = 20, trigger 13 ns ago
        let event = assemble(&ctx, &request(27.0)).unwrap();

        assert_eq!(event.event_number, 20 - 6);
        assert_eq!(event.timestamp, 28);
        assert_eq!(event.sim_trigger_time, 27.0 + 6.0);
        assert_eq!(event.trigger_source, "trig");
        assert_eq!(event.window, TimeWindow::new(-23.0, 177.0));
    }

    #[test]
    fn test_unknown_source() {
        let ctx = setup();
        assert!(matches!(
            assemble(&ctx, &request(0.0)),
            Err(ReadoutError::UnknownTrigger { .. })
        ));
    }
}
