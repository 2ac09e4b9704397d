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

use crate::support::error::Error;

/// Determine whether the given name is safe to use as a single file system
/// element.
///
/// This excludes empty names, names that cause directory traversal and names
/// containing path separators or ASCII control characters.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && "." != name
        && ".." != name
        && name.find('/').is_none()
        // Only a path separator on Windows, but always block since it has
        // high potential of causing problems
        && name.find('\\').is_none()
        && name.find(|c| c < ' ' || c == '\x7F').is_none()
}

/// Derive the Maildir++ directory name for the given folder id.
///
/// This is `.` followed by the folder id with `/` replaced by `.`. Literal
/// `.`, `%`, `\\` and control characters are percent-encoded, so every
/// non-empty folder id gets a distinct directory which is safe to create.
pub fn maildir_folder_name(folder_id: &str) -> Result<String, Error> {
    if folder_id.is_empty() {
        return Err(Error::UnsafeName(folder_id.to_owned()));
    }

    let mut name = String::with_capacity(folder_id.len() + 1);
    name.push('.');
    for ch in folder_id.chars() {
        match ch {
            '/' => name.push('.'),
            '.' | '%' | '\\' | '\x00'..='\x1F' | '\x7F' => {
                name.push_str(&format!("%{:02X}", ch as u32))
            },
            ch => name.push(ch),
        }
    }

    debug_assert!(is_safe_name(&name));
    Ok(name)
}

/// Produce a file-system and URL safe slug of `s`.
///
/// ASCII alphanumerics are kept (lower-cased); every run of anything else
/// becomes a single `-`. Leading and trailing dashes are removed. If nothing
/// is left, `default` is returned.
pub fn slugify(s: &str, default: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut pending_dash = false;
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        default.to_owned()
    } else {
        slug
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_is_safe_name() {
        assert!(is_safe_name("foo"));
        assert!(is_safe_name("Entwürfe"));
        assert!(is_safe_name("郵便"));
        assert!(is_safe_name(".INBOX.Sent"));
        assert!(is_safe_name("folder #1"));
        assert!(!is_safe_name(""));
        assert!(!is_safe_name("."));
        assert!(!is_safe_name(".."));
        assert!(!is_safe_name("foo/bar"));
        assert!(!is_safe_name("foo\\bar"));
        assert!(!is_safe_name("foo\0"));
        assert!(!is_safe_name("foo\r"));
        assert!(!is_safe_name("fo\x7Fo"));
    }

    #[test]
    fn test_maildir_folder_name() {
        assert_eq!(".INBOX", maildir_folder_name("INBOX").unwrap());
        assert_eq!(
            ".INBOX.Sent.2020",
            maildir_folder_name("INBOX/Sent/2020").unwrap()
        );
        assert_eq!(
            ".INBOX%2EArchive",
            maildir_folder_name("INBOX.Archive").unwrap()
        );
        assert_eq!(".%2E", maildir_folder_name(".").unwrap());
        assert_eq!(".%2E%2E", maildir_folder_name("..").unwrap());
        assert_eq!(".Work%5C2020", maildir_folder_name("Work\\2020").unwrap());
        assert_eq!(".a%0Ab%7F", maildir_folder_name("a\nb\x7F").unwrap());
        assert_eq!(".100%25", maildir_folder_name("100%").unwrap());
        assert_eq!(".Entwürfe", maildir_folder_name("Entwürfe").unwrap());
        assert!(maildir_folder_name("").is_err());
    }

    proptest! {
        #[test]
        fn maildir_folder_names_are_safe_and_distinct(
            a in "[a-z./%\\\\\x01\x7F]{1,8}",
            b in "[a-z./%\\\\\x01\x7F]{1,8}",
        ) {
            let name_a = maildir_folder_name(&a).unwrap();
            let name_b = maildir_folder_name(&b).unwrap();
            prop_assert!(is_safe_name(&name_a));
            prop_assert_eq!(a == b, name_a == name_b);
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!("inbox-sent", slugify("INBOX/Sent", "folder"));
        assert_eq!("lost-found", slugify("Lost & Found", "folder"));
        assert_eq!("entw-rfe", slugify("Entwürfe", "folder"));
        assert_eq!("folder", slugify("日本語", "folder"));
        assert_eq!("a-b", slugify("--a--b--", "folder"));
    }
}
