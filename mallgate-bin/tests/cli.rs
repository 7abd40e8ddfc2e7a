#[cfg(test)]
mod cli {
    use assert_cmd::{Command, cargo::cargo_bin_cmd};
    use predicates::str::contains;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::{error::Error, fs};
    use tempfile::{NamedTempFile, tempdir};

    type Result<T> = std::result::Result<T, Box<dyn Error>>;

    /// The binary, isolated from a config file or environment of the caller
    fn main_command() -> Result<Command> {
        let mut cmd = cargo_bin_cmd!();
        cmd.current_dir(tempdir()?.keep())
            .env_remove("RUST_LOG")
            .env_remove("MALLGATE_BUCKET_CAPACITY")
            .env_remove("MALLGATE_LEAK_RATE")
            .env_remove("MALLGATE_PER_MALL_MAX_RPS")
            .env_remove("MALLGATE_QUEUE_CAPACITY")
            .env_remove("MALLGATE_MAX_RETRIES");
        Ok(cmd)
    }

    fn json_output(cmd: &mut Command) -> Result<Value> {
        let output = cmd.output()?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    #[test]
    fn test_hello_world() -> Result<()> {
        main_command()?
            .arg("mall-a:hello")
            .assert()
            .success()
            .stdout(contains("[200] mall-a hello -> world (bucket 1/10)"))
            .stdout(contains("Per-mall metrics"))
            .stdout(contains("1 calls (0 rejected, 0%)"));
        Ok(())
    }

    #[test]
    fn test_json_output() -> Result<()> {
        let value = json_output(
            main_command()?.args(["--format", "json", "mall-a:hello", "mall-b:ping", "mall-a:pong"]),
        )?;

        assert_eq!(value["success"], true);
        let calls = value["calls"].as_array().ok_or("calls is not an array")?;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0]["state"], "completed");
        assert_eq!(calls[0]["key"], "mall-a");
        assert_eq!(calls[0]["result"], "world");
        assert_eq!(calls[0]["status_code"], 200);
        assert_eq!(calls[1]["result"], "ping");
        assert_eq!(calls[2]["result"], "pong");

        // Sorted by call count
        let metrics = value["mall_metrics"].as_array().ok_or("no metrics")?;
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0]["key"], "mall-a");
        assert_eq!(metrics[0]["total_calls"], 2);
        assert_eq!(metrics[1]["key"], "mall-b");
        assert_eq!(metrics[1]["rejections"], 0);
        Ok(())
    }

    #[test]
    fn test_calls_from_input_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        std::io::Write::write_all(
            &mut file,
            b"# warmup\nmall-a:hello\n\nmall-b:1\n  # done\n",
        )?;

        main_command()?
            .arg("--input")
            .arg(file.path())
            .assert()
            .success()
            .stdout(contains("[200] mall-a hello -> world"))
            .stdout(contains("[200] mall-b 1 -> 1"));
        Ok(())
    }

    #[test]
    fn test_calls_from_stdin() -> Result<()> {
        main_command()?
            .args(["--input", "-"])
            .write_stdin("mall-a:from-stdin\n")
            .assert()
            .success()
            .stdout(contains("mall-a from-stdin -> from-stdin"));
        Ok(())
    }

    #[test]
    fn test_requires_calls() -> Result<()> {
        main_command()?
            .assert()
            .failure()
            .code(2)
            .stderr(contains("CALL"));
        Ok(())
    }

    #[test]
    fn test_invalid_call() -> Result<()> {
        main_command()?
            .arg("no-separator")
            .assert()
            .failure()
            .code(1)
            .stderr(contains("Cannot parse calls from arguments"));
        Ok(())
    }

    #[test]
    fn test_queue_overflow_drops_calls() -> Result<()> {
        let calls: Vec<String> = (0..20).map(|i| format!("mall-a:{i}")).collect();
        main_command()?
            .args(["--queue-capacity", "1", "--max-requests-per-second", "1"])
            .args(&calls)
            .assert()
            .failure()
            .code(2)
            .stdout(contains("[DROPPED] mall-a"));
        Ok(())
    }

    #[test]
    fn test_timeout() -> Result<()> {
        main_command()?
            .args(["--timeout", "100ms", "--max-requests-per-second", "1"])
            .args(["mall-a:1", "mall-a:2"])
            .assert()
            .failure()
            .code(2)
            .stdout(contains("[200] mall-a 1 -> 1"))
            .stdout(contains("[TIMEOUT] mall-a 2"));
        Ok(())
    }

    #[test]
    fn test_invalid_setting_from_env() -> Result<()> {
        main_command()?
            .env("MALLGATE_QUEUE_CAPACITY", "0")
            .arg("mall-a:1")
            .assert()
            .failure()
            .code(3)
            .stderr(contains("queue_capacity must be greater than zero"));
        Ok(())
    }

    #[test]
    fn test_config_file() -> Result<()> {
        let dir = tempdir()?;
        let config = dir.path().join("custom.toml");
        fs::write(
            &config,
            r#"
            bucket_capacity = 4
            format = "json"

            [malls.mall-a]
            max_requests_per_second = 10
            "#,
        )?;

        let value = json_output(main_command()?.arg("--config").arg(&config).arg("mall-a:x"))?;
        assert_eq!(value["calls"][0]["bucket_max"], 4);
        Ok(())
    }

    #[test]
    fn test_default_config_file() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("mallgate.toml"), "format = \"json\"\n")?;

        let value = json_output(main_command()?.current_dir(dir.path()).arg("mall-a:x"))?;
        assert_eq!(value["success"], true);
        Ok(())
    }

    #[test]
    fn test_invalid_config_file() -> Result<()> {
        let dir = tempdir()?;
        let config = dir.path().join("broken.toml");
        fs::write(&config, "bucket_size = 3\n")?;

        main_command()?
            .arg("--config")
            .arg(&config)
            .arg("mall-a:x")
            .assert()
            .failure()
            .code(3)
            .stderr(contains("Cannot load configuration file"));
        Ok(())
    }

    #[test]
    fn test_missing_config_file() -> Result<()> {
        main_command()?
            .args(["--config", "does-not-exist.toml", "mall-a:x"])
            .assert()
            .failure()
            .code(3);
        Ok(())
    }

    #[test]
    fn test_verbose_logs_outcomes() -> Result<()> {
        main_command()?
            .args(["-v", "mall-a:hello"])
            .assert()
            .success()
            .stderr(contains("[INFO] Mall call mall=mall-a payload=hello status=200"));
        Ok(())
    }

    #[test]
    fn test_cli_wins_over_env() -> Result<()> {
        let value = json_output(
            main_command()?
                .env("MALLGATE_BUCKET_CAPACITY", "3")
                .args(["--bucket-capacity", "5", "--format", "json", "mall-a:x"]),
        )?;
        assert_eq!(value["calls"][0]["bucket_max"], 5);

        let value = json_output(
            main_command()?
                .env("MALLGATE_BUCKET_CAPACITY", "3")
                .args(["--format", "json", "mall-a:x"]),
        )?;
        assert_eq!(value["calls"][0]["bucket_max"], 3);
        Ok(())
    }
}
