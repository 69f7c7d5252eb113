//! Manage command line arguments here.
use clap::{App, Arg};
use std::net::IpAddr;
use std::str::FromStr;

use rpzlib::error::{RPZError, RPZResult};
use rpzlib::util::parse_zbits;
use rpzlib::zbits::ZBits;
use rpzlib::zone::TriggerKind;

/// This structure holds the command line arguments.
#[derive(Debug)]
pub struct CliOptions {
    pub file: String,
    pub ip: Option<IpAddr>,
    pub name: Option<String>,
    pub kind: Option<TriggerKind>,
    pub zones: ZBits,
    pub wait_recurse: bool,
    pub debug: bool,
}

impl CliOptions {
    pub fn options() -> RPZResult<Self> {
        let matches = App::new("RPZ query tool")
            .version("0.1")
            .about(
                r#"Load response policy zone trigger files and query the index

            Trigger files: a "zone <origin>" line declares the next policy zone,
            every other line is "<ordinal> <owner> [<cname-target>]"

            "#,
            )
            .arg(
                Arg::new("file")
                    .short('f')
                    .long("file")
                    .required(true)
                    .long_help("Trigger file to load")
                    .takes_value(true),
            )
            .arg(
                Arg::new("ip")
                    .short('i')
                    .long("ip")
                    .required(false)
                    .long_help("Address to look up")
                    .takes_value(true),
            )
            .arg(
                Arg::new("domain")
                    .short('d')
                    .long("domain")
                    .required(false)
                    .long_help("Domain to look up")
                    .takes_value(true),
            )
            .arg(
                Arg::new("kind")
                    .short('k')
                    .long("kind")
                    .required(false)
                    .long_help("Trigger kind to query: qname, ip, nsdname or nsip")
                    .takes_value(true),
            )
            .arg(
                Arg::new("zones")
                    .short('z')
                    .long("zones")
                    .required(false)
                    .long_help("Comma separated zone ordinals to consult (default: all)")
                    .takes_value(true),
            )
            .arg(
                Arg::new("wait-recurse")
                    .short('w')
                    .long("wait-recurse")
                    .required(false)
                    .long_help("Make every zone wait for recursion before deciding on qname")
                    .takes_value(false),
            )
            .arg(
                Arg::new("debug")
                    .short('g')
                    .long("debug")
                    .required(false)
                    .long_help("Debug mode")
                    .takes_value(false),
            )
            .get_matches();

        let kind = match matches.value_of("kind") {
            Some(k) => Some(TriggerKind::from_str(k)?),
            None => None,
        };

        let ip = match matches.value_of("ip") {
            Some(a) => Some(
                a.parse()
                    .map_err(|_| RPZError::new("invalid IP address"))?,
            ),
            None => None,
        };

        let zones = match matches.value_of("zones") {
            Some(z) => parse_zbits(z)?,
            None => ZBits::MAX,
        };

        Ok(CliOptions {
            file: String::from(matches.value_of("file").unwrap()),
            ip,
            name: matches.value_of("domain").map(String::from),
            kind,
            zones,
            wait_recurse: matches.is_present("wait-recurse"),
            debug: matches.is_present("debug"),
        })
    }
}
