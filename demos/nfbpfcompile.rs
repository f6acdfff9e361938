//! Compiles a filter expression into BPF and prints it in the encoding iptables'
//! nfbpf_compile uses.
use pcap_session::{FilterProgram, Linktype};

use std::env;
use std::process;

fn main() {
    let (layertype, prog) = match env::args().len() {
        2 => ("RAW".to_string(), env::args().nth(1).unwrap()),
        3 => (env::args().nth(1).unwrap(), env::args().nth(2).unwrap()),
        _ => {
            println!("Usage:    {} [type] 'program'", env::args().next().unwrap());
            println!("  type: a pcap linklayer type, e.g:");
            println!("      RAW, EN10MB");
            println!("  program: a pcap filter expression e.g.:");
            println!("      'tcp port 80'");
            process::exit(1);
        }
    };

    let lt = match Linktype::from_name(&layertype) {
        Ok(t) => t,
        Err(_) => {
            println!("Invalid linklayer type {}", layertype);
            process::exit(1);
        }
    };

    let program = match FilterProgram::compile(&prog, lt, 65535, None) {
        Ok(p) => p,
        Err(e) => {
            println!("{}", e);
            process::exit(1);
        }
    };
    let instructions = program.instructions();
    let def: String = instructions
        .iter()
        .map(|op| op.to_string())
        .collect::<Vec<_>>()
        .join(",");
    println!("{},{}", instructions.len(), def);
}
