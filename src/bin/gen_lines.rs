use std::fs;
use std::io;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use bytesize::ByteSize;
use env_logger;
use log;

use ext_line_sort::generator::LineGenerator;

fn main() {
    let arg_parser = build_arg_parser();

    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .init();

    let size = arg_parser
        .value_of("size")
        .expect("value is required")
        .parse::<ByteSize>()
        .expect("value is pre-validated");

    let output = match arg_parser.value_of("output") {
        Some(output) => output.to_string(),
        None => default_file_name(),
    };

    let mut output_stream = match fs::File::create(&output) {
        Ok(file) => io::BufWriter::new(file),
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };

    match LineGenerator::new().generate(&mut output_stream, size.as_u64()) {
        Ok(summary) => log::info!("{} lines ({} bytes) written to {}", summary.lines, summary.bytes, output),
        Err(err) => {
            log::error!("data generation error: {}", err);
            process::exit(2);
        }
    }
}

fn default_file_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();

    format!("{}.txt", millis)
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("gen-lines")
        .about("generates `<number>. <text>` test files")
        .arg(
            clap::Arg::new("size")
                .help("target file size, for example 100, 5K, 15MB, 10GiB")
                .required(true)
                .index(1)
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("output")
                .help("file to be created, defaults to `<unix-millis>.txt`")
                .index(2),
        )
        .get_matches()
}
