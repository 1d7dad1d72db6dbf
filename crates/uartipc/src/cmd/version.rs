use uartipc_frame::{FRAME_SIZE, MAX_FRAGMENT_SIZE, MAX_MESSAGE_SIZE};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("uartipc {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: uartipc");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("UARTIPC_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "wire: frame={FRAME_SIZE} fragment={MAX_FRAGMENT_SIZE} max_message={MAX_MESSAGE_SIZE} checksum=crc32"
    );
    println!(
        "features: backend={}, async={}, cli=true",
        cfg!(feature = "backend"),
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}
