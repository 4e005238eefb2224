// Copyright 2022 Stephen Checkoway
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::{app_from_crate, arg, App, AppSettings, ArgMatches};

use esp_romloader::{FileFirmware, SerialPortTransport, Session, SessionConfig, StdClock};

type Flasher = Session<SerialPortTransport, esp_romloader::DtrPin, esp_romloader::RtsPin, StdClock>;

fn arguments() -> ArgMatches {
    app_from_crate!()
        .global_setting(AppSettings::PropagateVersion)
        .global_setting(AppSettings::UseLongFormatForHelpSubcommand)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            arg!(-p --port <PORT> "Path to serial port")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-d --debug "Trace frames and commands crossing the wire")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-b --baud <BAUD> "Baud rate to switch to after connecting (ESP32 only)")
                .required(false)
                .global(true),
        )
        .subcommand(App::new("detect-chip").about("Identifies the attached chip"))
        .subcommand(App::new("list-ports").about("Lists available serial ports"))
        .subcommand(
            App::new("flash")
                .about("Writes a firmware image to flash")
                .arg(arg!(<FILE> "Path to the firmware image"))
                .arg(
                    arg!(-o --offset <OFFSET> "Flash offset in bytes")
                        .required(false)
                        .default_value("0x0"),
                )
                .arg(
                    arg!(--md5 <DIGEST> "Expected MD5 digest to verify against (ESP32 only)")
                        .required(false),
                )
                .arg(
                    arg!(--"flash-size" <BYTES> "Target flash capacity in bytes (required for ESP32)")
                        .required(false),
                ),
        )
        .get_matches()
}

fn open_connection(args: &ArgMatches) -> Result<Flasher> {
    use std::str::FromStr;

    let port = args.value_of("port").unwrap_or("/dev/ttyUSB0");
    let (serial, gpio0, reset_pin) = SerialPortTransport::open(port, 115200)
        .with_context(|| format!("failed to open serial port {port}"))?;

    let mut config = SessionConfig::new(serial, gpio0, reset_pin, StdClock)
        .debug(args.is_present("debug"));
    if let Some(bytes) = args.value_of("flash-size") {
        config = config.flash_size_bytes(parse_u32(bytes)?);
    }
    let mut session = config.build()?;

    session.reset(true)?;
    session.sync()?;
    if let Some(rate) = args.value_of("baud") {
        let rate = u32::from_str(rate).context("invalid --baud value")?;
        session.set_baud_rate(rate)?;
    }
    Ok(session)
}

fn parse_u32(text: &str) -> Result<u32> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Ok(u32::from_str_radix(hex, 16)?)
    } else {
        Ok(text.parse()?)
    }
}

fn main() -> Result<()> {
    let args = arguments();
    let (subcmd, sub_args) = args.subcommand().unwrap();

    match subcmd {
        "detect-chip" => {
            let mut session = open_connection(&args)?;
            println!("chip: {}", session.chip_name()?);
            let mac = session.mac_addr()?;
            println!(
                "mac: {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            );
            session.reset(false)?;
        }
        "list-ports" => {
            let ports = serialport::available_ports().context("failed to list serial ports")?;
            println!("{:#?}", ports);
        }
        "flash" => {
            let mut session = open_connection(&args)?;
            let path = sub_args.value_of("FILE").expect("required");
            let offset = parse_u32(sub_args.value_of("offset").unwrap_or("0x0"))?;
            let md5 = sub_args.value_of("md5");
            let mut firmware =
                FileFirmware::open(path).with_context(|| format!("failed to open {path}"))?;
            session.flash_file(&mut firmware, offset, md5, None)?;
            session.flash_end(true)?;
            println!("wrote {path} at offset {offset:#x}");
        }
        _ => unreachable!(),
    }

    Ok(())
}
