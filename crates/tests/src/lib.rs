//! # Integration Tests
//!
//! Cross-crate scenarios, no external input required:
//! - Configuration to emitted events through the reference drivers
//! - Event persistence through the dispatcher sinks
//! - Fatal configuration and contract errors surfacing from a run

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::fs;
    use std::io::Write;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ReadoutBlueprint, ReadoutError, ReadoutEvent, SinkConfig, SinkType};
    use dispatcher::{create_dispatcher, Dispatcher, MemorySink};
    use drivers::{build_simulation, Cluster, Hit, McParticle};
    use observability::ReadoutStatsAggregator;

    const CHAIN: &str = r#"
        [readout]
        readout_window_ns = 60
        trigger_offset_ns = 20

        [[drivers]]
        kind = "pulse_source"
        name = "pulses"
        channels = 32
        hit_probability = 0.2
        seed = 11

        [[drivers]]
        kind = "clusterer"
        name = "clusterer"
        time_displacement_ns = 8

        [[drivers]]
        kind = "threshold_trigger"
        name = "threshold"
        energy_threshold_mev = 60
        dead_time = 8

        [[streams]]
        name = "Hits"
        window_before_ns = 10
        window_after_ns = 10

        [[streams]]
        name = "McParticles"
        persistent = false
    "#;

    fn chain() -> ReadoutBlueprint {
        ConfigLoader::load_from_str(CHAIN, ConfigFormat::Toml).unwrap()
    }

    /// Run `steps` bunches through a dispatcher, returning the engine stats
    fn run(
        blueprint: &ReadoutBlueprint,
        dispatcher: &mut Dispatcher,
        steps: u64,
    ) -> Result<readout_engine::RunStats, ReadoutError> {
        let mut built = build_simulation(blueprint)?;
        let stats = built
            .simulation
            .run(steps, |event| dispatcher.dispatch(&event))?;
        dispatcher.close()?;
        Ok(stats)
    }

    /// End-to-end: config -> drivers -> engine -> memory sink
    #[test]
    fn test_e2e_memory_pipeline() {
        let sink = MemorySink::new("memory");
        let handle = sink.handle();
        let mut dispatcher = Dispatcher::with_sinks(vec![Box::new(sink)]);

        let stats = run(&chain(), &mut dispatcher, 400).unwrap();
        let events = handle.events();

        assert!(!events.is_empty(), "threshold trigger never fired");
        assert_eq!(stats.events, events.len() as u64);
        assert_eq!(dispatcher.event_count(), stats.events);

        for pair in events.windows(2) {
            // Single trigger driver with 8 bunches of dead time
            assert!(pair[1].trigger_time - pair[0].trigger_time >= 16.0);
            assert!(pair[1].event_number > pair[0].event_number);
        }

        for event in &events {
            assert_eq!(event.trigger_source, "threshold");
            // Trigger displacement is the clusterer's
            assert_eq!(event.sim_trigger_time - event.trigger_time, 8.0);

            let hits = event.items::<Hit>("Hits").unwrap();
            for hit in hits {
                assert!(hit.time_ns >= event.trigger_time - 10.0);
                assert!(hit.time_ns < event.trigger_time + 10.0);
            }

            let clusters = event.items::<Cluster>("Clusters").unwrap();
            for cluster in clusters {
                assert!(cluster.time_ns >= event.trigger_time - 20.0);
                assert!(cluster.time_ns < event.trigger_time + 40.0);
            }
            // The event was triggered by a cluster over threshold at its trigger time
            assert!(clusters
                .iter()
                .any(|c| c.time_ns == event.trigger_time && c.energy_mev >= 60.0));

            // Truth is written on trigger only, for the selected hits
            let truth = event.items::<McParticle>("McParticles").unwrap();
            for particle in truth {
                assert!(hits.iter().any(|h| h.particle == particle.id));
            }
        }
    }

    /// Same seed, same events
    #[test]
    fn test_e2e_deterministic() {
        let collect = || {
            let sink = MemorySink::new("memory");
            let handle = sink.handle();
            let mut dispatcher = Dispatcher::with_sinks(vec![Box::new(sink)]);
            run(&chain(), &mut dispatcher, 200).unwrap();
            handle
                .events()
                .iter()
                .map(|e| serde_json::to_value(e).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(collect(), collect());
    }

    /// End-to-end: config file with a file sink -> JSON lines on disk
    #[test]
    fn test_e2e_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("run").join("events.jsonl");

        let mut config = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            config,
            "{CHAIN}\n[[sinks]]\nname = \"file\"\nsink_type = \"file\"\nparams = {{ path = \"{}\" }}\n",
            output.display()
        )
        .unwrap();

        let blueprint = ConfigLoader::load_from_path(config.path()).unwrap();
        let mut dispatcher = create_dispatcher(&blueprint.sinks).unwrap();
        let stats = run(&blueprint, &mut dispatcher, 300).unwrap();

        let content = fs::read_to_string(&output).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len() as u64, stats.events);
        for line in &lines {
            assert_eq!(line["trigger_source"], "threshold");
            assert!(line["collections"]["Hits"].is_object());
        }

        let metrics = dispatcher.metrics();
        assert_eq!(metrics[0].0, "file");
        assert_eq!(metrics[0].1.write_count, stats.events);
    }

    /// JSON and TOML describe the same run
    #[test]
    fn test_json_config_matches_toml() {
        let json = ConfigLoader::to_json(&chain()).unwrap();
        let from_json = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();

        let events = |blueprint: &ReadoutBlueprint| {
            let mut built = build_simulation(blueprint).unwrap();
            let mut numbers = Vec::new();
            built
                .simulation
                .run(200, |event| {
                    numbers.push(event.event_number);
                    Ok(())
                })
                .unwrap();
            numbers
        };
        assert_eq!(events(&chain()), events(&from_json));
    }

    /// Retention keeps buffers bounded over a long run
    #[test]
    fn test_retention_bounds_buffers() {
        let depth = |enabled: bool| {
            let mut blueprint = chain();
            blueprint.retention.enabled = enabled;
            let mut built = build_simulation(&blueprint).unwrap();
            built.simulation.run(2000, |_| Ok(())).unwrap();
            built.simulation.context().buffered_batches("Hits").unwrap()
        };

        let bounded = depth(true);
        let unbounded = depth(false);
        assert!(bounded < unbounded);
        assert!(bounded <= 300, "retention kept {bounded} batches");
        assert!(unbounded > 1000);
    }

    /// Statistics aggregated from the emitted events agree with the engine
    #[test]
    fn test_stats_aggregation() {
        let mut built = build_simulation(&chain()).unwrap();
        let bunch = built.simulation.context().settings().beam_bunch;
        let mut aggregator = ReadoutStatsAggregator::new();

        for _ in 0..300 {
            if let Some(event) = built.simulation.step().unwrap() {
                let emitted_at = built.simulation.context().current_time() - bunch;
                aggregator.update(&event, emitted_at);
            }
        }

        let stats = built.simulation.stats();
        assert_eq!(aggregator.total_events, stats.events);
        assert_eq!(aggregator.total_elements, stats.elements);
        if stats.events > 0 {
            // Ready once the after-window has passed the clusterer's displacement
            assert!(aggregator.latency_stats.min() >= 40.0 + 8.0);
            assert!((aggregator.window_stats.mean() - 60.0).abs() < 1e-9);
        }
    }

    /// A trigger reading a collection of the wrong element type aborts the run
    #[test]
    fn test_type_mismatch_aborts_run() {
        let mut blueprint = chain();
        if let Some(contracts::DriverConfig::ThresholdTrigger(trigger)) =
            blueprint.drivers.last_mut()
        {
            trigger.input = "Hits".to_string();
        }

        let mut dispatcher = Dispatcher::default();
        let result = run(&blueprint, &mut dispatcher, 10);
        assert!(matches!(result, Err(ReadoutError::TypeMismatch { .. })));
    }

    /// Inputs must be registered before the driver that reads them
    #[test]
    fn test_driver_order_is_validated() {
        let source = r#"
            [[drivers]]
            kind = "clusterer"
            name = "clusterer"

            [[drivers]]
            kind = "pulse_source"
            name = "pulses"
        "#;
        let result = ConfigLoader::load_from_str(source, ConfigFormat::Toml);
        assert!(matches!(result, Err(ReadoutError::ConfigValidation { .. })));
    }

    /// A blueprint skipping validation still fails fast in the engine
    #[test]
    fn test_unvalidated_blueprint_fails_at_registration() {
        let mut blueprint = chain();
        blueprint.drivers.swap(0, 1);
        assert!(matches!(
            build_simulation(&blueprint),
            Err(ReadoutError::UnregisteredDependency { .. })
        ));
    }

    /// A sink failure aborts the run with the sink error
    #[test]
    fn test_sink_failure_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let configs = vec![SinkConfig {
            name: "file".to_string(),
            sink_type: SinkType::File,
            params: HashMap::from([(
                "path".to_string(),
                dir.path().join("events.jsonl").display().to_string(),
            )]),
        }];
        let mut dispatcher = create_dispatcher(&configs).unwrap();
        // Closed sinks reject further writes
        dispatcher.close().unwrap();

        let mut built = build_simulation(&chain()).unwrap();
        let result = built
            .simulation
            .run(400, |event: ReadoutEvent| dispatcher.dispatch(&event));
        assert!(matches!(result, Err(ReadoutError::SinkWrite { .. })));
    }
}
