/// ASCII PLY decoder
use nalgebra::Point3;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::{space0, space1, u32 as dec_u32, u64 as dec_u64},
    combinator::{all_consuming, map, rest, value},
    multi::separated_list1,
    number::complete::float,
    sequence::{preceded, separated_pair, terminated, tuple},
    IResult,
};
use tracing::{debug, trace, warn};

use crate::error::DecodeError;
use crate::geometry::{ParsedMesh, TriangleIndices};

/// Only the ASCII encoding is supported.
const ASCII_FORMAT: &str = "ascii";

#[derive(Debug, Clone, PartialEq)]
enum HeaderLine<'a> {
    Format(&'a str),
    Element(&'a str, u64),
    Property(&'a str),
    Ignored,
    End,
}

#[derive(Debug)]
struct ElementDecl<'a> {
    name: &'a str,
    count: usize,
    properties: Vec<&'a str>,
}

/// Decode an ASCII PLY payload into vertex and triangle buffers.
///
/// Vertex records must all be present; face records are read up to the
/// declared budget. Faces with an arity other than three are skipped but still
/// use up one slot of the budget.
pub fn decode(raw: &str) -> Result<ParsedMesh, DecodeError> {
    let mut lines = raw
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    match lines.next() {
        Some((_, "ply")) => {}
        _ => return Err(DecodeError::malformed("missing `ply` magic line")),
    }

    let elements = parse_header(&mut lines)?;

    let vertex_decl = elements
        .iter()
        .find(|e| e.name == "vertex")
        .ok_or_else(|| DecodeError::malformed("header declares no vertex element"))?;
    let color_slots = color_slots(&vertex_decl.properties);

    let mut mesh = ParsedMesh::default();
    let mut colors = Vec::new();
    let mut skipped_faces = 0usize;

    for element in &elements {
        match element.name {
            "vertex" => {
                mesh.vertices.reserve(element.count.min(1 << 20));
                for n in 0..element.count {
                    let (line_no, line) = lines.next().ok_or_else(|| {
                        DecodeError::malformed(format!(
                            "header declares {} vertices but only {n} were found",
                            element.count
                        ))
                    })?;
                    let (_, fields) = vertex_record(line).map_err(|_| {
                        DecodeError::malformed(format!("line {line_no}: unreadable vertex record"))
                    })?;
                    if fields.len() < 3 {
                        return Err(DecodeError::malformed(format!(
                            "line {line_no}: vertex record has {} numeric fields, need 3",
                            fields.len()
                        )));
                    }
                    mesh.vertices
                        .push(Point3::new(fields[0], fields[1], fields[2]));
                    if let Some(slots) = color_slots {
                        colors.push(read_color(&fields, slots).ok_or_else(|| {
                            DecodeError::malformed(format!(
                                "line {line_no}: vertex record is missing color fields"
                            ))
                        })?);
                    }
                }
            }
            "face" => {
                for _ in 0..element.count {
                    let Some((line_no, line)) = lines.next() else {
                        break;
                    };
                    let (_, fields) = face_record(line).map_err(|_| {
                        DecodeError::malformed(format!("line {line_no}: unreadable face record"))
                    })?;
                    match fields.as_slice() {
                        [3, a, b, c, ..] => mesh.triangles.push([*a, *b, *c]),
                        [3, ..] => {
                            return Err(DecodeError::malformed(format!(
                                "line {line_no}: triangle record has fewer than three indices"
                            )))
                        }
                        _ => skipped_faces += 1,
                    }
                }
            }
            other => {
                trace!(target: "decode", element = other, count = element.count, "skipping element");
                for _ in 0..element.count {
                    if lines.next().is_none() {
                        break;
                    }
                }
            }
        }
    }

    check_indices(&mesh.triangles, mesh.vertices.len())?;

    if skipped_faces > 0 {
        debug!(target: "decode", skipped_faces, "skipped non-triangle face records");
    }
    let trailing = lines.count();
    if trailing > 0 {
        warn!(target: "decode", trailing, "ignoring data lines past the declared elements");
    }

    if color_slots.is_some() {
        mesh.colors = Some(colors);
    }

    debug!(
        target: "decode",
        vertices = mesh.vertices.len(),
        triangles = mesh.triangles.len(),
        colored = mesh.colors.is_some(),
        "decoded ply payload"
    );
    Ok(mesh)
}

fn parse_header<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
) -> Result<Vec<ElementDecl<'a>>, DecodeError> {
    let mut format = None;
    let mut elements: Vec<ElementDecl<'a>> = Vec::new();

    for (line_no, line) in lines.by_ref() {
        let parsed = match all_consuming(header_line)(line) {
            Ok((_, parsed)) => parsed,
            Err(_) => {
                debug!(target: "decode", line_no, "ignoring unrecognized header line");
                continue;
            }
        };
        match parsed {
            HeaderLine::Format(name) => {
                if name != ASCII_FORMAT {
                    return Err(DecodeError::UnsupportedFormat {
                        format: name.to_string(),
                    });
                }
                format = Some(name);
            }
            HeaderLine::Element(name, count) => {
                let count = usize::try_from(count).map_err(|_| {
                    DecodeError::malformed(format!("line {line_no}: element count too large"))
                })?;
                elements.push(ElementDecl {
                    name,
                    count,
                    properties: Vec::new(),
                });
            }
            HeaderLine::Property(name) => match elements.last_mut() {
                Some(element) => element.properties.push(name),
                None => {
                    return Err(DecodeError::malformed(format!(
                        "line {line_no}: property declared before any element"
                    )))
                }
            },
            HeaderLine::Ignored => {}
            HeaderLine::End => {
                if format.is_none() {
                    return Err(DecodeError::malformed("header has no format line"));
                }
                return Ok(elements);
            }
        }
    }

    Err(DecodeError::malformed("missing `end_header` terminator"))
}

fn word(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace())(input)
}

fn header_line(input: &str) -> IResult<&str, HeaderLine<'_>> {
    alt((
        value(HeaderLine::End, tag("end_header")),
        map(
            tuple((tag("format"), space1, word, space1, word)),
            |(_, _, name, _, _version)| HeaderLine::Format(name),
        ),
        map(
            preceded(
                terminated(tag("element"), space1),
                separated_pair(word, space1, dec_u64),
            ),
            |(name, count)| HeaderLine::Element(name, count),
        ),
        // `property <type> <name>` or `property list <count-type> <item-type> <name>`;
        // the declared name is always the last token.
        map(preceded(terminated(tag("property"), space1), rest), |decl: &str| {
            HeaderLine::Property(decl.split_whitespace().last().unwrap_or(decl))
        }),
        value(
            HeaderLine::Ignored,
            tuple((alt((tag("comment"), tag("obj_info"))), rest)),
        ),
    ))(input)
}

/// Leading numeric fields of a vertex record; anything after them is ignored.
fn vertex_record(input: &str) -> IResult<&str, Vec<f32>> {
    terminated(separated_list1(space1, float), space0)(input)
}

fn face_record(input: &str) -> IResult<&str, Vec<u32>> {
    all_consuming(terminated(separated_list1(space1, dec_u32), space0))(input)
}

/// Positions of the `red`, `green`, `blue` properties, if all are declared.
fn color_slots(properties: &[&str]) -> Option<[usize; 3]> {
    let slot = |name: &str| properties.iter().position(|p| *p == name);
    Some([slot("red")?, slot("green")?, slot("blue")?])
}

fn read_color(fields: &[f32], slots: [usize; 3]) -> Option<[u8; 3]> {
    let channel = |i: usize| fields.get(i).map(|v| v.clamp(0.0, 255.0) as u8);
    Some([channel(slots[0])?, channel(slots[1])?, channel(slots[2])?])
}

fn check_indices(triangles: &[TriangleIndices], vertex_count: usize) -> Result<(), DecodeError> {
    for (n, corners) in triangles.iter().enumerate() {
        if let Some(bad) = corners.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(DecodeError::malformed(format!(
                "triangle {n} references vertex {bad} but only {vertex_count} were declared"
            )));
        }
    }
    Ok(())
}
