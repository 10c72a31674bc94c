use criterion::{criterion_group, criterion_main, Criterion};
use scanguard::scanner::{parse, validate_options, validate_targets, Scanner};
use std::hint::black_box;

const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap" args="nmap -sV -p 22,80 -oX - 10.0.0.1" start="1700000000" version="7.94">
<host starttime="1700000000" endtime="1700000003"><status state="up" reason="syn-ack"/>
<address addr="10.0.0.1" addrtype="ipv4"/>
<ports>
<port protocol="tcp" portid="22"><state state="open" reason="syn-ack"/><service name="ssh" product="OpenSSH" version="9.6"/></port>
<port protocol="tcp" portid="80"><state state="open" reason="syn-ack"/><service name="http" product="nginx"/></port>
</ports>
</host>
<runstats><finished time="1700000003" elapsed="3.10" exit="success"/><hosts up="1" down="0" total="1"/></runstats>
</nmaprun>"#;

fn bench_validation(c: &mut Criterion) {
    let targets = "192.168.1.1 10.0.0.0/8 192.168.1.1-254 2001:db8::/32 scanme.nmap.org *.example.com";
    let many_targets = vec!["192.168.1.1"; 256].join(" ");

    c.bench_function("validate_targets_mixed", |b| {
        b.iter(|| black_box(validate_targets(black_box(targets))));
    });

    c.bench_function("validate_targets_256", |b| {
        b.iter(|| black_box(validate_targets(black_box(&many_targets))));
    });

    c.bench_function("validate_options", |b| {
        b.iter(|| black_box(validate_options(black_box("-sV -sC -Pn -p '22, 80, 443' --top-ports 100"))));
    });

    let scanner = Scanner::default();
    c.bench_function("prepare_command", |b| {
        b.iter(|| black_box(scanner.prepare(black_box(targets), black_box("-A -p 1-1024"))));
    });
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_report", |b| {
        b.iter(|| black_box(parse(black_box(REPORT))));
    });
}

criterion_group!(benches, bench_validation, bench_parse);
criterion_main!(benches);
