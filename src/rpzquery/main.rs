//! A query driver for the RPZ trigger index: load trigger files through the
//! begin/add/ready protocol, then answer one address or name question.
use std::collections::HashMap;
use std::fs;

use log::debug;

use rpzlib::{
    error::{RPZError, RPZResult},
    index::Rpzs,
    name::DomainName,
    policy::{decode_cname, Policy},
    util::pretty_rpzs,
    zone::TriggerKind,
};

mod args;
use args::CliOptions;

mod display;
use display::{display_name_match, DisplayWrapper};

fn main() -> RPZResult<()> {
    // manage arguments from command line
    let options = CliOptions::options()?;
    debug!("options: {:?}", &options);

    // build the index from the trigger file
    let rpzs = Rpzs::new(options.wait_recurse);
    let targets = load_file(&rpzs, &options.file)?;

    if options.debug {
        pretty_rpzs(&rpzs);
    }

    if let Some(addr) = options.ip {
        let kind = options.kind.unwrap_or(TriggerKind::Ip);
        match rpzs.find_ip(kind, options.zones, &addr) {
            Some(hit) => {
                let policy = owner_policy(&rpzs, &hit.owner, hit.zone, &targets);
                println!("{} policy:{}", DisplayWrapper(&hit), policy);
            }
            None => println!("{}: no match", addr),
        }
    }

    if let Some(name) = &options.name {
        let kind = options.kind.unwrap_or(TriggerKind::Qname);
        let qname = DomainName::try_from(name.as_str())?;
        let zbits = rpzs.find_name(kind, options.zones, &qname);
        if zbits == 0 {
            println!("{}: no match", qname);
        } else {
            display_name_match(&rpzs, zbits, kind, &qname, &targets);
        }
    }

    Ok(())
}

// Load one trigger file. A "zone <origin>" line declares the next policy
// zone; every other line is "<ordinal> <owner> [<cname-target>]". Targets
// are kept aside: the index itself only stores which owner matched.
fn load_file(rpzs: &Rpzs, path: &str) -> RPZResult<HashMap<String, DomainName>> {
    let content = fs::read_to_string(path)?;
    let mut triggers: Vec<Vec<DomainName>> = Vec::new();
    let mut targets = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let first = match fields.next() {
            Some(f) => f,
            None => continue,
        };

        if first == "zone" {
            let origin = fields
                .next()
                .ok_or_else(|| RPZError::new("missing zone origin"))?;
            rpzs.new_zone(DomainName::try_from(origin)?)?;
            triggers.push(Vec::new());
            continue;
        }

        let num: usize = first.parse()?;
        let owner = fields
            .next()
            .ok_or_else(|| RPZError::new("missing trigger owner"))?;
        let owner = DomainName::try_from(owner)?;
        if let Some(target) = fields.next() {
            targets.insert(owner.to_string(), DomainName::try_from(target)?);
        }

        triggers
            .get_mut(num)
            .ok_or_else(|| RPZError::new("trigger for an undeclared zone"))?
            .push(owner);
    }

    // one begin/ready bracket per declared zone
    for (num, owners) in triggers.iter().enumerate() {
        let mut handle = rpzs.begin(num as u8)?;
        for owner in owners {
            rpzs.add(&mut handle, owner)?;
        }
        rpzs.ready(handle)?;
    }

    Ok(targets)
}

// Decode the matched owner's policy when the file carried a target for it
fn owner_policy(
    rpzs: &Rpzs,
    owner: &DomainName,
    num: rpzlib::zbits::ZoneNum,
    targets: &HashMap<String, DomainName>,
) -> Policy {
    let zone = match rpzs.zone(num) {
        Some(z) => z,
        None => return Policy::Error,
    };
    match targets.get(&owner.to_string()) {
        Some(target) => decode_cname(&zone, std::slice::from_ref(target), owner),
        None => Policy::Given,
    }
}
