use epidyn::{Compartment, Record, SweepResult};
use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
    process::Command,
};

fn run_bin(args: &[&str]) -> bool {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_epidyn"));

    let output = Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command");

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

    if !output.status.success() {
        eprintln!("binary failed with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n");
    }
    output.status.success()
}

fn read_file<T: serde::de::DeserializeOwned>(file: &Path) -> T {
    let file = File::open(file).expect("failed to open output file");
    rmp_serde::decode::from_read(BufReader::new(file)).expect("failed to decode output file")
}

fn setup_dir(name: &str, config_contents: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");
    fs::write(test_dir.join("config.toml"), config_contents).expect("failed to write config file");

    test_dir
}

#[test]
fn basic_workflow() {
    let config_contents = String::new()
        + "[model]\n"
        + "kind = \"seir\"\n"
        + "beta = 2.0\n"
        + "mu = 0.0\n"
        + "sigma = 1.0\n"
        + "gamma = 0.5\n"
        + "n = 1.0\n"
        + "\n"
        + "[init]\n"
        + "state = [ 0.999, 0.0, 0.001, 0.0,]\n"
        + "\n"
        + "[sweep]\n"
        + "n_points = 12\n"
        + "compartment = \"R\"\n";
    let test_dir = setup_dir("basic_workflow", &config_contents);
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    assert!(run_bin(&["--sim-dir", test_dir_str, "trace"]));
    let records: Vec<Record> = read_file(&test_dir.join("trajectory.msgpack"));
    assert_eq!(records.len(), 4 * 260);
    assert_eq!(records[0].time, 0.0);
    assert_eq!(records[0].state, Compartment::S);
    assert_eq!(records[0].number, 0.999);
    assert_eq!(records[2].state, Compartment::I);
    assert_eq!(records[2].number, 0.001);

    assert!(run_bin(&["--sim-dir", test_dir_str, "sweep"]));
    let sweep: SweepResult = read_file(&test_dir.join("sweep.msgpack"));
    assert_eq!(sweep.compartment, Compartment::R);
    assert_eq!(sweep.len(), 12);
    assert_eq!(sweep.points[0].r0, 0.1);
    assert_eq!(sweep.points[11].r0, 5.0);
    assert!(sweep.points.iter().all(|p| p.final_size.is_some()));

    assert!(run_bin(&["--sim-dir", test_dir_str, "clean"]));
    assert!(!test_dir.join("trajectory.msgpack").exists());
    assert!(!test_dir.join("sweep.msgpack").exists());
    assert!(test_dir.join("config.toml").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn invalid_config_fails() {
    let config_contents = String::new()
        + "[model]\n"
        + "kind = \"sir\"\n"
        + "beta = 2.0\n"
        + "mu = 0.0\n"
        + "gamma = 0.5\n"
        + "n = 1.0\n"
        + "\n"
        + "[init]\n"
        + "state = [ 0.999, 0.0, 0.001, 0.0,]\n";
    let test_dir = setup_dir("invalid_config_fails", &config_contents);
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    assert!(!run_bin(&["--sim-dir", test_dir_str, "trace"]));
    assert!(!test_dir.join("trajectory.msgpack").exists());

    fs::remove_dir_all(&test_dir).ok();
}
