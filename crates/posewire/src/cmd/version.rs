use posewire_frame::{DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
use posewire_peer::{DEFAULT_CONTROL_PORT, DEFAULT_DATA_PORT, DEFAULT_DISCOVERY_PORT};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("posewire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: posewire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("POSEWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("frame_header: {HEADER_SIZE} bytes, max payload {DEFAULT_MAX_PAYLOAD}");
    println!(
        "ports: discovery={DEFAULT_DISCOVERY_PORT} data={DEFAULT_DATA_PORT} control={DEFAULT_CONTROL_PORT}"
    );
    println!("features: peer={}, cli=true", cfg!(feature = "peer"));

    Ok(SUCCESS)
}
