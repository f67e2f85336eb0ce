#[cfg(test)]
mod tests {
    use clap::Parser;
    use warden_cli::{Cli, Simulation, run_simulation};
    use warden_config::WardenConfig;

    fn sim(frame: &str, tool: &str) -> Simulation {
        Simulation {
            agent: "sim-agent".into(),
            frame: frame.into(),
            tool: tool.into(),
            args: "{}".into(),
            interpretation: None,
            behavior: Vec::new(),
            baseline: None,
            expect: Vec::new(),
            repeat: 1,
            approve: false,
        }
    }

    fn quiet_config() -> WardenConfig {
        let mut config = WardenConfig::default();
        config.tripwire.enabled = false;
        config
    }

    mod parsing {
        use super::*;

        #[test]
        fn test_parse_simulate() {
            let cli = Cli::try_parse_from([
                "warden", "simulate", "--frame", "●◆→α", "--tool", "pay_invoice", "--behavior",
                "pay_invoice", "--behavior", "send_receipt", "-n", "3",
            ]);
            assert!(cli.is_ok());
        }

        #[test]
        fn test_simulate_requires_frame_and_tool() {
            assert!(Cli::try_parse_from(["warden", "simulate", "--tool", "x"]).is_err());
            assert!(Cli::try_parse_from(["warden", "simulate", "--frame", "●◆→α"]).is_err());
        }

        #[test]
        fn test_verbose_conflicts_with_quiet() {
            assert!(Cli::try_parse_from(["warden", "-v", "-q", "check-config"]).is_err());
        }

        #[test]
        fn test_global_config_flag() {
            let cli = Cli::try_parse_from(["warden", "tripwire", "--json", "--config", "/tmp/w.toml"]);
            assert!(cli.is_ok());
        }
    }

    mod simulate {
        use super::*;

        #[tokio::test]
        async fn test_clean_simulation_echoes() {
            let results = run_simulation(quiet_config(), &sim("●◆→α", "pay_invoice"))
                .await
                .unwrap();
            assert_eq!(results.len(), 1);
            assert!(results[0].success);
            let content = &results[0].result.as_ref().unwrap().content;
            assert_eq!(content["echo"], "pay_invoice");
        }

        #[tokio::test]
        async fn test_bad_arguments_are_an_error() {
            let mut s = sim("●◆→α", "pay_invoice");
            s.args = "{not json".into();
            assert!(run_simulation(quiet_config(), &s).await.is_err());
        }

        #[tokio::test]
        async fn test_hold_is_approved_and_resumed() {
            let mut config = quiet_config();
            config.hold.mcp_validation_tools = vec!["dangerous_*".into()];
            let mut s = sim("●◆→α", "dangerous_op");

            let held = run_simulation(config.clone(), &s).await.unwrap();
            assert!(held[0].held);

            s.approve = true;
            let resumed = run_simulation(config, &s).await.unwrap();
            assert!(resumed[0].success);
            assert!(!resumed[0].held);
        }

        #[tokio::test]
        async fn test_baseline_drift_shows_in_audit() {
            let mut s = sim("●◆→α", "pay_invoice");
            s.baseline = Some("pay the invoice".into());
            s.behavior = vec!["pay_invoice".into(), "audit_log".into()];
            let results = run_simulation(quiet_config(), &s).await.unwrap();
            let audit = results[0].post_audit.as_ref().unwrap();
            assert!(audit.comparison.has_baseline);
            assert!(audit.comparison.drift_score > 0.0);
            assert_eq!(audit.alerts.len(), 1);
        }

        #[tokio::test]
        async fn test_repeat() {
            let mut s = sim("●◆→α", "pay_invoice");
            s.repeat = 4;
            let results = run_simulation(quiet_config(), &s).await.unwrap();
            assert_eq!(results.len(), 4);
            assert!(results.iter().all(|r| r.success));
        }
    }
}
