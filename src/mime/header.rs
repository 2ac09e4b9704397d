//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mail Archiver.
//
// Mail Archiver is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mail Archiver is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// Mail Archiver. If not, see <http://www.gnu.org/licenses/>.

//! Utilities for working with individual RFC 5322 headers.

use std::str;

use chrono::prelude::*;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag_no_case, take, take_while1, take_while_m_n},
    character::complete::char,
    combinator::{map, map_res, opt},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::support::error::Error;

/// The raw header section of a message.
///
/// Values are kept as raw bytes with folding removed; decoding them is the
/// job of `normalize`.
#[derive(Clone, Debug, Default)]
pub struct HeaderBlock {
    headers: Vec<(String, Vec<u8>)>,
}

impl HeaderBlock {
    /// Split the header section off `message` and unfold it.
    ///
    /// `message` may use either DOS or UNIX line endings. The header section
    /// ends at the first blank line or at the end of the data.
    ///
    /// Lines which are not headers (e.g. an mbox `From ` line) are skipped.
    /// Fails if not a single header could be found, since such data is
    /// unlikely to be a message at all.
    pub fn parse(message: &[u8]) -> Result<Self, Error> {
        let mut headers: Vec<(String, Vec<u8>)> = Vec::new();
        let mut continuable = false;

        for line in message.split(|&b| b'\n' == b) {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                break;
            }

            if b' ' == line[0] || b'\t' == line[0] {
                if continuable {
                    if let Some((_, value)) = headers.last_mut() {
                        value.extend_from_slice(line);
                    }
                }
                continue;
            }

            continuable = false;
            let colon = match memchr::memchr(b':', line) {
                Some(colon) => colon,
                None => continue,
            };

            let name = &line[..colon];
            if name.is_empty()
                || !name.iter().all(|&b| b > b' ' && b < 0x7F)
            {
                continue;
            }

            let value = &line[colon + 1..];
            let value = match value.iter().position(|&b| b' ' != b) {
                Some(start) => &value[start..],
                None => &[][..],
            };

            // Infallible since the name is known to be printable ASCII
            let name = str::from_utf8(name).unwrap_or_default().to_owned();
            headers.push((name, value.to_vec()));
            continuable = true;
        }

        if headers.is_empty() {
            Err(Error::NoHeaders)
        } else {
            Ok(HeaderBlock { headers })
        }
    }

    /// Return the raw value of the first header called `name`, compared
    /// case-insensitively.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| name.eq_ignore_ascii_case(n))
            .map(|(_, v)| &v[..])
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.headers.len()
    }
}

/// Extract a message id from the value of `Message-ID`, `In-Reply-To` and
/// similar headers.
///
/// This is the first `<...>` token if there is one, and otherwise the first
/// whitespace-delimited word, since plenty of agents omit the brackets.
/// Returns `None` if the value is blank.
pub fn parse_message_id(value: &str) -> Option<String> {
    if let Some(start) = value.find('<') {
        if let Some(len) = value[start..].find('>') {
            return Some(value[start..=start + len].to_owned());
        }
    }

    value.split_whitespace().next().map(str::to_owned)
}

/// Reduce an address header to its first bare address.
///
/// `"Jane Doe" <jane@example.com>, bob@example.com` becomes
/// `jane@example.com`. If there is no angle-bracketed address, the value
/// (minus any comment) is returned trimmed.
pub fn simplify_address(value: &str) -> String {
    if let Some(start) = value.find('<') {
        if let Some(len) = value[start + 1..].find('>') {
            return value[start + 1..start + 1 + len].trim().to_owned();
        }
    }

    let first = value.split(',').next().unwrap_or("");
    let without_comment = match first.find('(') {
        Some(ix) => &first[..ix],
        None => first,
    };
    without_comment.trim().to_owned()
}

/// Parse an RFC 5322 date-time, including the obsolete forms and the
/// sloppiness commonly seen in the wild.
///
/// The day of the week is optional and ignored, seconds are optional, and
/// anything after the zone (typically a comment like `(PDT)`) is ignored.
/// Unknown zone names are treated as UTC, as RFC 5322 requires for military
/// zones.
pub fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    date_time(s).ok().and_then(|(_, dt)| dt)
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

// RFC 5322 3.2.2 "Comment". Note it is recursive.
fn comment(i: &str) -> IResult<&str, ()> {
    map(
        delimited(
            char('('),
            many0(alt((
                map(is_not("()\\"), |_| ()),
                map(preceded(char('\\'), take(1usize)), |_| ()),
                comment,
            ))),
            char(')'),
        ),
        |_| (),
    )(i)
}

// RFC 5322 3.2.2 "Comment or folding white space", which may be empty.
fn cfws(i: &str) -> IResult<&str, ()> {
    map(
        many0(alt((
            map(take_while1(|c: char| c.is_whitespace()), |_| ()),
            comment,
        ))),
        |_| (),
    )(i)
}

fn day_of_week(i: &str) -> IResult<&str, ()> {
    map(
        tuple((
            cfws,
            take_while1(|c: char| c.is_ascii_alphabetic()),
            cfws,
            char(','),
        )),
        |_| (),
    )(i)
}

fn day(i: &str) -> IResult<&str, u32> {
    map_res(take_while_m_n(1, 2, is_digit), str::parse::<u32>)(i)
}

fn month(i: &str) -> IResult<&str, u32> {
    // Matching on the prefix also accepts the long names some agents use
    alt((
        map(tag_no_case("jan"), |_| 1),
        map(tag_no_case("feb"), |_| 2),
        map(tag_no_case("mar"), |_| 3),
        map(tag_no_case("apr"), |_| 4),
        map(tag_no_case("may"), |_| 5),
        map(tag_no_case("jun"), |_| 6),
        map(tag_no_case("jul"), |_| 7),
        map(tag_no_case("aug"), |_| 8),
        map(tag_no_case("sep"), |_| 9),
        map(tag_no_case("oct"), |_| 10),
        map(tag_no_case("nov"), |_| 11),
        map(tag_no_case("dec"), |_| 12),
    ))(i)
}

fn month_tail(i: &str) -> IResult<&str, &str> {
    take_while_m_n(0, 16, |c: char| c.is_ascii_alphabetic())(i)
}

fn year(i: &str) -> IResult<&str, i32> {
    map_res(take_while_m_n(2, 4, is_digit), |s: &str| {
        s.parse::<i32>().map(|y| {
            // Y2K compliance workarounds described by RFC 5322 4.3
            if s.len() == 2 && y < 50 {
                y + 2000
            } else if s.len() < 4 {
                y + 1900
            } else {
                y
            }
        })
    })(i)
}

fn time_unit(i: &str) -> IResult<&str, u32> {
    map_res(take_while_m_n(1, 2, is_digit), str::parse::<u32>)(i)
}

fn time_of_day(i: &str) -> IResult<&str, (u32, u32, u32)> {
    map(
        tuple((
            time_unit,
            preceded(pair(char(':'), cfws), time_unit),
            opt(preceded(pair(char(':'), cfws), time_unit)),
        )),
        |(h, m, s)| (h, m, s.unwrap_or(0)),
    )(i)
}

// Returns the offset in seconds east of UTC.
fn numeric_zone(i: &str) -> IResult<&str, i32> {
    map_res(
        pair(
            alt((char('+'), char('-'))),
            take_while_m_n(4, 4, is_digit),
        ),
        |(sign, digits): (char, &str)| {
            digits.parse::<i32>().map(|hhmm| {
                let secs = hhmm / 100 * 3600 + hhmm % 100 * 60;
                if '-' == sign {
                    -secs
                } else {
                    secs
                }
            })
        },
    )(i)
}

fn zone(i: &str) -> IResult<&str, i32> {
    const HOUR: i32 = 3600;
    alt((
        numeric_zone,
        map(alt((tag_no_case("gmt"), tag_no_case("ut"))), |_| 0),
        map(tag_no_case("edt"), |_| -4 * HOUR),
        map(alt((tag_no_case("est"), tag_no_case("cdt"))), |_| -5 * HOUR),
        map(alt((tag_no_case("cst"), tag_no_case("mdt"))), |_| -6 * HOUR),
        map(alt((tag_no_case("mst"), tag_no_case("pdt"))), |_| -7 * HOUR),
        map(tag_no_case("pst"), |_| -8 * HOUR),
        map(take_while1(|c: char| c.is_ascii_alphabetic()), |_| 0),
    ))(i)
}

fn date_time(i: &str) -> IResult<&str, Option<DateTime<FixedOffset>>> {
    map(
        preceded(
            opt(day_of_week),
            tuple((
                preceded(cfws, day),
                preceded(cfws, month),
                // Skip the tail of long month names, like "July"
                preceded(pair(month_tail, cfws), year),
                preceded(cfws, time_of_day),
                opt(preceded(cfws, zone)),
            )),
        ),
        |(day, month, year, (hour, minute, second), zone)| {
            FixedOffset::east_opt(zone.unwrap_or(0)).and_then(|off| {
                off.with_ymd_and_hms(
                    year,
                    month,
                    day,
                    hour,
                    minute,
                    // Leap seconds are not worth failing over
                    second.min(59),
                )
                .single()
            })
        },
    )(i)
}
