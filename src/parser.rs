//! Tag-list grammar (RFC 6376 section 3.2) shared by the `DKIM-Signature`
//! codec and the DNS TXT record decoder.

use nom::bytes::complete::{tag as nom_tag, take_while, take_while1};
use nom::character::complete::multispace0;
use nom::combinator::opt;
use nom::multi::separated_list1;
use nom::sequence::delimited;
use nom::IResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

fn is_tag_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// tag-name FWS? "=" FWS? tag-value. Values run to the next semicolon and may
// span folded lines; surrounding whitespace is not part of the value.
fn tag_spec(input: &str) -> IResult<&str, Tag> {
    let (input, _) = multispace0(input)?;
    let (input, name) = take_while1(is_tag_name_char)(input)?;
    let (input, _) = delimited(multispace0, nom_tag("="), multispace0)(input)?;
    let (input, value) = take_while(|c| c != ';')(input)?;
    Ok((
        input,
        Tag {
            name: name.to_owned(),
            value: value.trim().to_owned(),
        },
    ))
}

/// Parses a full tag-value list, tolerating a trailing semicolon.
pub fn tag_list(input: &str) -> IResult<&str, Vec<Tag>> {
    let (input, tags) = separated_list1(nom_tag(";"), tag_spec)(input)?;
    let (input, _) = opt(nom_tag(";"))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, tags))
}
