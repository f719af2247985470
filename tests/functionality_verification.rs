//! End-to-end checks of the host driver against the statically linked
//! tiger and parrot plugins.

mod common;

/// Tiger, parrot and a missing module, under every strategy
#[cfg(test)]
mod scenario_tests {
    use super::common;
    use menagerie::driver::{run_batch, AnimalRecord, Outcome, PluginRequest};
    use menagerie::plugins::AllocationStrategy;

    fn requests() -> Vec<PluginRequest> {
        ["tiger", "parrot", "does_not_exist"]
            .into_iter()
            .map(|name| PluginRequest::new(name, "Modrobradi").unwrap())
            .collect()
    }

    #[test]
    fn test_scenario_under_every_strategy() {
        for strategy in AllocationStrategy::ALL {
            let mut factory = common::zoo_factory();
            let report = run_batch(&mut factory, &requests(), strategy);

            assert_eq!(report.strategy, strategy);
            assert_eq!(report.entries.len(), 3, "{strategy}");
            assert_eq!(
                report.entries[0].outcome,
                Outcome::Constructed(AnimalRecord {
                    name: "Modrobradi".to_string(),
                    greeting: "Mijau!".to_string(),
                    menu: "mlako mlijeko.".to_string(),
                })
            );
            assert_eq!(
                report.entries[1].outcome,
                Outcome::Constructed(AnimalRecord {
                    name: "Modrobradi".to_string(),
                    greeting: "Sto mu gromova!".to_string(),
                    menu: "brazilske orahe.".to_string(),
                })
            );
            assert!(matches!(
                report.entries[2].outcome,
                Outcome::Failed { resolution: true, .. }
            ));
        }
    }

    #[test]
    fn test_scenario_output_lines() {
        let mut factory = common::zoo_factory();
        let report = run_batch(&mut factory, &requests(), AllocationStrategy::Heap);
        let lines = report.lines();

        assert_eq!(
            &lines[..4],
            &[
                "Modrobradi pozdravlja: Mijau!",
                "Modrobradi voli mlako mlijeko.",
                "Modrobradi pozdravlja: Sto mu gromova!",
                "Modrobradi voli brazilske orahe.",
            ]
        );
        assert_eq!(lines.len(), 5);
        assert!(lines[4].starts_with("Creation of plug-in object does_not_exist failed"));
        assert!(lines[4].contains("not found"));
    }

    #[test]
    fn test_failure_does_not_stop_the_batch() {
        let mut factory = common::zoo_factory();
        let requests: Vec<PluginRequest> = ["does_not_exist", "also_missing", "parrot"]
            .into_iter()
            .map(|name| PluginRequest::new(name, "Koko").unwrap())
            .collect();

        let report = run_batch(&mut factory, &requests, AllocationStrategy::StackScoped);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.entries[2].module, "parrot");
        assert_eq!(report.lines().last().unwrap(), "Koko voli brazilske orahe.");
    }

    #[test]
    fn test_empty_batch() {
        let mut factory = common::zoo_factory();
        let report = run_batch(&mut factory, &[], AllocationStrategy::CallerSupplied);
        assert!(report.entries.is_empty());
        assert!(report.lines().is_empty());
    }
}

/// Batches over fixture modules that break the contract
#[cfg(test)]
mod fixture_batch_tests {
    use super::common;
    use menagerie::driver::{run_batch, Outcome, PluginRequest};
    use menagerie::plugins::AllocationStrategy;

    #[test]
    fn test_per_strategy_failures_are_reported_per_name() {
        let mut factory = common::fixture_factory();
        let requests: Vec<PluginRequest> = ["heap_only", "whale", "tiger"]
            .into_iter()
            .map(|name| PluginRequest::new(name, "Modrobradi").unwrap())
            .collect();

        let report = run_batch(&mut factory, &requests, AllocationStrategy::CallerSupplied);
        let statuses: Vec<bool> = report
            .entries
            .iter()
            .map(|entry| matches!(entry.outcome, Outcome::Constructed(_)))
            .collect();
        assert_eq!(statuses, vec![false, false, true]);

        let lines = report.lines();
        assert!(lines[0].contains("does not export `create_on_predefined_mem`"));
        assert!(lines[1].contains("4096 bytes aligned to 8"));
        assert_eq!(lines[2], "Modrobradi pozdravlja: Mijau!");
    }

    #[test]
    fn test_heap_only_module_under_heap() {
        let mut factory = common::fixture_factory();
        let requests = vec![PluginRequest::new("heap_only", "Modrobradi").unwrap()];

        let report = run_batch(&mut factory, &requests, AllocationStrategy::Heap);
        assert_eq!(report.succeeded(), 1);
    }
}

/// Directory discovery with files that are not loadable
#[cfg(test)]
mod discovery_tests {
    use menagerie::driver::{run_discovered, Outcome};
    use menagerie::plugins::{discover_modules, AllocationStrategy, DynamicLoader, Factory};
    use std::env::consts::DLL_EXTENSION;
    use tempfile::tempdir;

    #[test]
    fn test_broken_libraries_are_reported_and_skipped() {
        let dir = tempdir().unwrap();
        for name in ["b_broken", "a_broken"] {
            std::fs::write(dir.path().join(format!("{name}.{DLL_EXTENSION}")), b"garbage").unwrap();
        }

        let modules = discover_modules(dir.path()).unwrap();
        let mut factory = Factory::new(DynamicLoader::new());
        let report = run_discovered(&mut factory, &modules, AllocationStrategy::Heap);

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.entries[0].module, "a_broken");
        assert_eq!(report.entries[1].module, "b_broken");
        assert!(report.lines()[0].starts_with("Creation of plug-in object a_broken failed"));
        assert!(report
            .entries
            .iter()
            .all(|entry| matches!(entry.outcome, Outcome::Failed { resolution: true, .. })));
    }
}

/// Name round-trips through every strategy
#[cfg(test)]
mod property_tests {
    use super::common;
    use menagerie::plugins::{AllocationStrategy, Animal};
    use proptest::prelude::*;
    use std::ffi::CString;

    proptest! {
        #[test]
        fn constructor_arg_round_trips(name in "[^\\x00]{0,48}", strategy_index in 0usize..3) {
            let strategy = AllocationStrategy::ALL[strategy_index];
            let arg = CString::new(name.clone()).unwrap();
            let mut factory = common::zoo_factory();

            for module in ["tiger", "parrot"] {
                let seen = factory
                    .visit(module, &arg, strategy, |animal| animal.name().into_owned())
                    .unwrap();
                prop_assert_eq!(&seen, &name);
            }
        }
    }
}
