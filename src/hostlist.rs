//! # Hostlist Module
//!
//! Midplane labels are rendered in the fabric's coordinate alphabet, where
//! index i (0..36) maps to `'0'..'9','A'..'Z'`.  A label is the 4-character
//! string of a coordinate, e.g. `(0,2,1,3)` renders as `0213`.
//!
//! Sets of labels travel as *compressed hostlists*.  A set that exactly
//! fills its 4-D bounding box renders as a box range, `[0000x0111]`;
//! anything else renders as a bracketed comma list.  Expressions may carry
//! an alphabetic prefix (`bgq[0000x0111]`); expansion preserves it and
//! coordinate recovery reads the trailing 4 characters of each name.

use regex::Regex;
use crate::fabric::types::{Coord,Error,DIMS};

/// The coordinate alphabet.
pub const ALPHA_NUM: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Map a coordinate component to its label character, None if out of range.
pub fn coord_char(val: u16) -> Option<char> {
    ALPHA_NUM.chars().nth(val as usize)
}

/// Map a label character back to a coordinate component, None if invalid.
pub fn coord_val(c: char) -> Option<u16> {
    match c {
        '0'..='9' => Some(c as u16 - '0' as u16),
        'A'..='Z' => Some(c as u16 - 'A' as u16 + 10),
        _ => None
    }
}

/// Render a coordinate as its 4-character label.
/// Panics if a component exceeds the alphabet; the fabric constructor
/// guarantees this cannot happen for any midplane it owns.
pub fn label(coord: &Coord) -> String {
    let mut ans = String::new();
    for dim in 0..DIMS {
        match coord_char(coord[dim]) {
            Some(c) => ans.push(c),
            None => panic!("coordinate {} beyond the label alphabet",coord[dim])
        }
    }
    ans
}

/// Read the trailing 4 characters of a name as a coordinate.
pub fn trailing_coord(name: &str) -> Result<Coord,Error> {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() < DIMS {
        return Err(Error::BadHostlist);
    }
    let mut coord: Coord = [0;DIMS];
    for dim in 0..DIMS {
        match coord_val(chars[chars.len()-DIMS+dim]) {
            Some(v) => coord[dim] = v,
            None => return Err(Error::BadHostlist)
        }
    }
    Ok(coord)
}

/// Compress a set of labels.  Duplicates are dropped and ordering is
/// normalized, so any two equal sets compress identically.
pub fn compress(labels: &[String]) -> String {
    let mut sorted = labels.to_vec();
    sorted.sort();
    sorted.dedup();
    if sorted.is_empty() {
        return String::new();
    }
    if sorted.len() == 1 {
        return sorted[0].clone();
    }
    // box detection only applies to uniform 4-character alphabet labels
    let boxable = sorted.iter().all(|l| l.len() == DIMS && l.chars().all(|c| coord_val(c).is_some()));
    if boxable {
        let mut lo: Coord = [u16::MAX;DIMS];
        let mut hi: Coord = [0;DIMS];
        for l in &sorted {
            for (dim,c) in l.chars().enumerate() {
                let v = coord_val(c).unwrap();
                if v < lo[dim] {
                    lo[dim] = v;
                }
                if v > hi[dim] {
                    hi[dim] = v;
                }
            }
        }
        let volume: usize = (0..DIMS).map(|d| (hi[d] - lo[d] + 1) as usize).product();
        if volume == sorted.len() {
            return format!("[{}x{}]",label(&lo),label(&hi));
        }
    }
    format!("[{}]",sorted.join(","))
}

/// Expand a compressed hostlist into individual names.
/// Accepts bare names, `prefix[l1,l2,...]` lists, and `prefix[AxB]` box
/// ranges, joined at the top level by commas.
pub fn expand(expr: &str) -> Result<Vec<String>,Error> {
    let bracketed = Regex::new(r"^([0-9A-Za-z_-]*)\[([^\[\]]*)\]$").expect("regex parsing error");
    let mut ans: Vec<String> = Vec::new();
    for token in split_outside_brackets(expr) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some(caps) = bracketed.captures(token) {
            let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            for item in caps.get(2).map(|m| m.as_str()).unwrap_or("").split(',') {
                let item = item.trim();
                if item.is_empty() {
                    return Err(Error::BadHostlist);
                }
                match item.split_once('x') {
                    Some((lo,hi)) if lo.len() == DIMS && hi.len() == DIMS => {
                        for l in expand_box(lo,hi)? {
                            ans.push(format!("{}{}",prefix,l));
                        }
                    },
                    _ => ans.push(format!("{}{}",prefix,item))
                }
            }
        } else if token.contains('[') || token.contains(']') {
            return Err(Error::BadHostlist);
        } else {
            ans.push(token.to_string());
        }
    }
    Ok(ans)
}

/// every label inside the box spanned by two corner labels
fn expand_box(lo: &str,hi: &str) -> Result<Vec<String>,Error> {
    let mut lo_c: Coord = [0;DIMS];
    let mut hi_c: Coord = [0;DIMS];
    for (dim,(a,b)) in lo.chars().zip(hi.chars()).enumerate() {
        match (coord_val(a),coord_val(b)) {
            (Some(va),Some(vb)) if va <= vb => {
                lo_c[dim] = va;
                hi_c[dim] = vb;
            },
            _ => return Err(Error::BadHostlist)
        }
    }
    let mut ans = Vec::new();
    let mut curr = lo_c;
    loop {
        ans.push(label(&curr));
        // odometer with the last axis fastest
        let mut dim = DIMS;
        loop {
            if dim == 0 {
                return Ok(ans);
            }
            dim -= 1;
            if curr[dim] < hi_c[dim] {
                curr[dim] += 1;
                break;
            }
            curr[dim] = lo_c[dim];
        }
    }
}

/// split on commas that are not enclosed in brackets
fn split_outside_brackets(expr: &str) -> Vec<String> {
    let mut ans = Vec::new();
    let mut depth = 0;
    let mut curr = String::new();
    for c in expr.chars() {
        match c {
            '[' => {
                depth += 1;
                curr.push(c);
            },
            ']' => {
                depth -= 1;
                curr.push(c);
            },
            ',' if depth == 0 => {
                ans.push(curr.clone());
                curr.clear();
            },
            _ => curr.push(c)
        }
    }
    ans.push(curr);
    ans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet() {
        assert_eq!(coord_char(0),Some('0'));
        assert_eq!(coord_char(10),Some('A'));
        assert_eq!(coord_char(35),Some('Z'));
        assert_eq!(coord_char(36),None);
        assert_eq!(coord_val('7'),Some(7));
        assert_eq!(coord_val('B'),Some(11));
        assert_eq!(coord_val('a'),None);
        assert_eq!(label(&[0,10,2,35]),"0A2Z");
    }

    #[test]
    fn trailing() {
        assert_eq!(trailing_coord("bgq0123"),Ok([0,1,2,3]));
        assert_eq!(trailing_coord("01B2"),Ok([0,1,11,2]));
        assert_eq!(trailing_coord("x0"),Err(Error::BadHostlist));
        assert_eq!(trailing_coord("node-0a00"),Err(Error::BadHostlist));
    }

    #[test]
    fn compress_box() {
        let labels: Vec<String> = vec!["0000","0001","0010","0011","0100","0101","0110","0111"]
            .iter().map(|s| s.to_string()).collect();
        assert_eq!(compress(&labels),"[0000x0111]");
    }

    #[test]
    fn compress_list() {
        let labels: Vec<String> = vec!["0003","0000","0001"]
            .iter().map(|s| s.to_string()).collect();
        assert_eq!(compress(&labels),"[0000,0001,0003]");
        assert_eq!(compress(&["0200".to_string()]),"0200");
        assert_eq!(compress(&[]),"");
    }

    #[test]
    fn expand_round_trip() {
        let hosts = expand("[0000x0111]").expect("bad expression");
        assert_eq!(hosts.len(),8);
        assert_eq!(hosts[0],"0000");
        assert_eq!(hosts[7],"0111");
        assert_eq!(compress(&hosts),"[0000x0111]");
    }

    #[test]
    fn expand_prefixed() {
        let hosts = expand("bgq[0000x0001],bgq0100").expect("bad expression");
        assert_eq!(hosts,vec!["bgq0000","bgq0001","bgq0100"]);
        assert_eq!(expand("0000").expect("bad expression"),vec!["0000"]);
        assert!(expand("odd[").is_err());
        assert!(expand("[000Gx0000]").is_err());
    }
}
