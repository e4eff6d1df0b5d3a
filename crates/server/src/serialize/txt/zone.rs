// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::{fmt::Write as _, net::Ipv4Addr};

use super::zone_lex::{Lexer, Token};
use crate::{
    error::{PersistenceError, PersistenceResult},
    proto::rr::Name,
    record::{escape_txt, RecordValue, ZoneRecord},
    serial::SerialNumber,
    store::{SoaParams, ZoneState},
};

/// Maximum length of one character-string, RFC 1035 3.3
const MAX_CHARACTER_STRING: usize = 255;

/// Render the zone as a master file
///
/// ```text
/// $ORIGIN zone.example.
/// $TTL 3600
/// zone.example. 3600 IN SOA ns.zone.example. hostmaster.zone.example. 42 3600 600 604800 300
/// zone.example. 3600 IN NS ns.zone.example.
/// h1.zone.example. 3600 IN A 192.0.2.1
/// ```
///
/// Every owner is written fully qualified and one record per line, so the output can be parsed
/// back with [`Parser`].
pub fn emit(zone: &ZoneState) -> String {
    let origin = zone.origin();
    let ttl = zone.apex_ttl();
    let soa = zone.soa();

    let mut out = String::new();
    // writing to a String is infallible
    let _ = writeln!(out, "; zone {origin} serial {}", zone.serial());
    let _ = writeln!(out, "$ORIGIN {origin}");
    let _ = writeln!(out, "$TTL {ttl}");
    let _ = writeln!(
        out,
        "{origin} {ttl} IN SOA {mname} {rname} {serial} {refresh} {retry} {expire} {minimum}",
        mname = soa.mname,
        rname = soa.rname,
        serial = zone.serial(),
        refresh = soa.refresh,
        retry = soa.retry,
        expire = soa.expire,
        minimum = soa.minimum,
    );
    for ns in zone.name_servers() {
        let _ = writeln!(out, "{origin} {ttl} IN NS {ns}");
    }

    for record in zone.records() {
        match record.value() {
            RecordValue::TXT(text) => {
                let _ = write!(out, "{} {} IN TXT", record.owner(), record.ttl());
                for chunk in txt_chunks(text) {
                    let _ = write!(out, " \"{}\"", escape_txt(chunk));
                }
                out.push('\n');
            }
            RecordValue::A(_) => {
                let _ = writeln!(out, "{record}");
            }
        }
    }

    out
}

/// Split TXT data into character-strings of at most 255 bytes, on char boundaries
fn txt_chunks(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > MAX_CHARACTER_STRING {
        let mut end = MAX_CHARACTER_STRING;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }
    chunks.push(rest);
    chunks
}

/// Parses the master files written by [`emit`]
///
/// Only what the zone store manages is understood: `$ORIGIN` and `$TTL`, the apex `SOA` and
/// `NS` records, and `A` and `TXT` records inside the zone. Anything else is a
/// [`PersistenceErrorKind::ZoneParse`](crate::error::PersistenceErrorKind::ZoneParse) error.
pub struct Parser<'a> {
    input: &'a str,
    origin: Option<Name>,
}

struct Soa {
    params: SoaParams,
    serial: SerialNumber,
    ttl: u32,
}

#[derive(Default)]
struct ParseState {
    origin: Option<Name>,
    ttl: Option<u32>,
    owner: Option<Name>,
    soa: Option<Soa>,
    name_servers: Vec<Name>,
    records: Vec<ZoneRecord>,
}

impl<'a> Parser<'a> {
    /// Creates a parser over the full text of a zone file
    ///
    /// `origin` is the zone name to assume until a `$ORIGIN` directive is seen.
    pub fn new(input: &'a str, origin: Option<Name>) -> Self {
        Self { input, origin }
    }

    /// Parse the whole file
    pub fn parse(self) -> PersistenceResult<ZoneState> {
        let mut state = ParseState {
            origin: self.origin,
            ..ParseState::default()
        };

        for (idx, line) in self.input.lines().enumerate() {
            let line_no = idx + 1;
            let tokens = Lexer::new(line)
                .tokens()
                .map_err(|reason| PersistenceError::parse(line_no, reason))?;
            if tokens.is_empty() {
                continue;
            }

            state
                .line(tokens)
                .map_err(|reason| PersistenceError::parse(line_no, reason))?;
        }

        state.finish()
    }
}

impl ParseState {
    fn line(&mut self, tokens: Vec<Token>) -> Result<(), String> {
        let mut tokens = tokens.into_iter();

        let owner = match tokens.next() {
            Some(Token::Origin) => {
                let origin = self.name(&expect_data(tokens.next(), "$ORIGIN name")?)?;
                expect_end(tokens)?;
                self.origin = Some(origin);
                return Ok(());
            }
            Some(Token::Ttl) => {
                let ttl = parse_u32(&expect_data(tokens.next(), "$TTL value")?, "TTL")?;
                expect_end(tokens)?;
                self.ttl = Some(ttl);
                return Ok(());
            }
            Some(Token::Blank) => self
                .owner
                .clone()
                .ok_or_else(|| "no previous owner for blank owner".to_string())?,
            Some(Token::At) => self.origin()?.clone(),
            Some(Token::CharData(name)) => self.name(&name)?,
            Some(Token::Quoted(_)) => return Err("unexpected quoted string".to_string()),
            None => return Ok(()),
        };
        self.owner = Some(owner.clone());

        // [<TTL>] [<class>] <type> or [<class>] [<TTL>] <type>
        let mut ttl = None;
        let mut rtype = None;
        for token in tokens.by_ref() {
            let Token::CharData(data) = token else {
                return Err("expected TTL, class or type".to_string());
            };

            if data.eq_ignore_ascii_case("IN") {
                continue;
            } else if ttl.is_none() && data.bytes().all(|b| b.is_ascii_digit()) {
                ttl = Some(parse_u32(&data, "TTL")?);
            } else {
                rtype = Some(data.to_ascii_uppercase());
                break;
            }
        }

        let rtype = rtype.ok_or_else(|| "missing record type".to_string())?;
        let ttl = ttl
            .or(self.ttl)
            .ok_or_else(|| "record without TTL and no $TTL".to_string())?;
        let rdata = tokens.collect::<Vec<_>>();

        match rtype.as_str() {
            "SOA" => self.soa(owner, ttl, rdata),
            "NS" => {
                self.expect_apex(&owner, "NS")?;
                let [Token::CharData(ns)] = rdata.as_slice() else {
                    return Err("NS expects one name".to_string());
                };
                let ns = self.name(ns)?;
                if !self.name_servers.contains(&ns) {
                    self.name_servers.push(ns);
                }
                Ok(())
            }
            "A" => {
                let [Token::CharData(addr)] = rdata.as_slice() else {
                    return Err("A expects one address".to_string());
                };
                let addr = addr
                    .parse::<Ipv4Addr>()
                    .map_err(|_| format!("bad IPv4 address: {addr}"))?;
                self.record(ZoneRecord::new(owner, RecordValue::A(addr), ttl))
            }
            "TXT" => {
                if rdata.is_empty() {
                    return Err("TXT expects at least one string".to_string());
                }
                let mut text = String::new();
                for token in rdata {
                    match token {
                        Token::Quoted(s) | Token::CharData(s) => text.push_str(&s),
                        _ => return Err("unexpected token in TXT data".to_string()),
                    }
                }
                self.record(ZoneRecord::new(owner, RecordValue::TXT(text), ttl))
            }
            other => Err(format!("unsupported record type: {other}")),
        }
    }

    fn soa(&mut self, owner: Name, ttl: u32, rdata: Vec<Token>) -> Result<(), String> {
        self.expect_apex(&owner, "SOA")?;
        if self.soa.is_some() {
            return Err("duplicate SOA".to_string());
        }

        let fields = rdata
            .into_iter()
            .map(|token| match token {
                Token::CharData(data) => Ok(data),
                Token::At => Ok("@".to_string()),
                _ => Err("unexpected token in SOA".to_string()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let [mname, rname, serial, refresh, retry, expire, minimum] = fields.as_slice() else {
            return Err(format!("SOA expects 7 fields, found {}", fields.len()));
        };

        self.soa = Some(Soa {
            params: SoaParams {
                mname: self.name(mname)?,
                rname: self.name(rname)?,
                refresh: parse_u32(refresh, "refresh")?,
                retry: parse_u32(retry, "retry")?,
                expire: parse_u32(expire, "expire")?,
                minimum: parse_u32(minimum, "minimum")?,
            },
            serial: SerialNumber::new(parse_u32(serial, "serial")?),
            ttl,
        });
        Ok(())
    }

    fn record(&mut self, record: ZoneRecord) -> Result<(), String> {
        let origin = self.origin()?;
        if !origin.zone_of(record.owner()) {
            return Err(format!("{} is outside of zone {origin}", record.owner()));
        }

        let key = record.key();
        if self.records.iter().any(|r| r.key() == key) {
            return Err(format!(
                "duplicate {} record for {}",
                record.record_type(),
                record.owner()
            ));
        }

        self.records.push(record);
        Ok(())
    }

    fn expect_apex(&self, owner: &Name, rtype: &str) -> Result<(), String> {
        let origin = self.origin()?;
        if owner != origin {
            return Err(format!("{rtype} is only supported at the apex {origin}"));
        }
        Ok(())
    }

    fn origin(&self) -> Result<&Name, String> {
        self.origin
            .as_ref()
            .ok_or_else(|| "no $ORIGIN for relative name".to_string())
    }

    /// Absolute names are taken as is, relative ones are appended to the origin
    fn name(&self, name: &str) -> Result<Name, String> {
        if name == "@" {
            return self.origin().cloned();
        }

        let parsed = Name::from_ascii(name).map_err(|e| format!("bad name {name}: {e}"))?;
        if parsed.is_fqdn() {
            return Ok(parsed);
        }

        parsed
            .append_domain(self.origin()?)
            .map_err(|e| format!("bad name {name}: {e}"))
    }

    fn finish(self) -> PersistenceResult<ZoneState> {
        let Some(origin) = self.origin else {
            return Err(PersistenceError::parse(0, "zone has no $ORIGIN"));
        };
        let Some(soa) = self.soa else {
            return Err(PersistenceError::parse(0, "zone has no SOA record"));
        };

        let mut zone = ZoneState::new(origin, soa.serial, soa.ttl, soa.params, Vec::new());
        for ns in self.name_servers {
            zone.push_name_server(ns);
        }
        for record in self.records {
            zone.upsert(record);
        }

        Ok(zone)
    }
}

fn expect_data(token: Option<Token>, what: &str) -> Result<String, String> {
    match token {
        Some(Token::CharData(data)) => Ok(data),
        _ => Err(format!("expected {what}")),
    }
}

fn expect_end(mut tokens: impl Iterator<Item = Token>) -> Result<(), String> {
    match tokens.next() {
        None => Ok(()),
        Some(token) => Err(format!("unexpected trailing {token:?}")),
    }
}

fn parse_u32(data: &str, what: &str) -> Result<u32, String> {
    data.parse::<u32>()
        .map_err(|_| format!("bad {what}: {data}"))
}
