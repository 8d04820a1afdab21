use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
struct Config {
    application: Application,
    engine: Engine,
    transmit: Transmit,
    receive: Receive,
    logging: Logging,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Engine {
    sample_rate: u32,
    samples_per_frame: u32,
    sample_format: String,
    sound_marker_threshold: f32,
}

#[derive(Deserialize)]
struct Transmit {
    protocol_id: i32,
    volume: i32,
    max_payload_length: usize,
}

#[derive(Deserialize)]
struct Receive {
    decode_buffer_len: usize,
}

#[derive(Deserialize)]
struct Logging {
    truncate_length: usize,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 引擎参数
    println!("cargo:rustc-env=ENGINE_SAMPLE_RATE={}", config.engine.sample_rate);
    println!("cargo:rustc-env=ENGINE_SAMPLES_PER_FRAME={}", config.engine.samples_per_frame);
    println!("cargo:rustc-env=ENGINE_SAMPLE_FORMAT={}", config.engine.sample_format);
    println!(
        "cargo:rustc-env=ENGINE_SOUND_MARKER_THRESHOLD={}",
        config.engine.sound_marker_threshold
    );

    // 发送参数
    println!("cargo:rustc-env=TX_PROTOCOL_ID={}", config.transmit.protocol_id);
    println!("cargo:rustc-env=TX_VOLUME={}", config.transmit.volume);
    println!("cargo:rustc-env=TX_MAX_PAYLOAD_LENGTH={}", config.transmit.max_payload_length);

    println!("cargo:rustc-env=RX_DECODE_BUFFER_LEN={}", config.receive.decode_buffer_len);
    println!("cargo:rustc-env=LOG_TRUNCATE_LENGTH={}", config.logging.truncate_length);

    if std::env::var_os("CARGO_FEATURE_GGWAVE_NATIVE").is_some() {
        link_ggwave();
    }
}

fn link_ggwave() {
    let target = std::env::var("TARGET").unwrap_or_default();

    if target.contains("musl") {
        // musl 目标：使用手动编译的静态库，不依赖 pkg-config
        if let Ok(sysroot) = std::env::var("MUSL_SYSROOT") {
            println!("cargo:rustc-link-search=native={}/usr/lib", sysroot);
        }
        println!("cargo:rustc-link-lib=static=ggwave");
        println!("cargo:rustc-link-lib=stdc++");
        return;
    }

    pkg_config::Config::new()
        .probe("ggwave")
        .expect("Failed to find ggwave. Please install libggwave or disable the ggwave-native feature.");
}
