//! Parser for FXML markup → GlueDocument.
//!
//! Built on `winnow` 0.7. This is a lossless tokenizer, not a validating XML
//! parser: every whitespace run, comment, CDATA section and processing
//! instruction is kept as an auxiliary node so the emitter can write the
//! document back unchanged.

use crate::error::{ParseError, TextPosition};
use crate::glue::{GlueAttribute, GlueAux, GlueDocument, GlueId, TopLevel, unescape};
use smallvec::SmallVec;
use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::{take_till, take_until, take_while};

/// Parse markup text into a Glue document. All-or-nothing: on error no
/// document is returned.
pub fn parse_glue(input: &str) -> Result<GlueDocument, ParseError> {
    Builder::new(input).run()
}

struct Builder<'s> {
    source: &'s str,
    doc: GlueDocument,
    stack: Vec<GlueId>,
    pending: Vec<GlueAux>,
    main_seen: bool,
}

impl<'s> Builder<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            doc: GlueDocument::new(),
            stack: Vec::new(),
            pending: Vec::new(),
            main_seen: false,
        }
    }

    fn position(&self, rest: &str) -> TextPosition {
        TextPosition::at_offset(self.source, self.source.len() - rest.len())
    }

    fn error(&self, message: impl Into<String>, at: &str) -> ParseError {
        ParseError::new(message, self.position(at))
    }

    fn push_aux(&mut self, aux: GlueAux) {
        if self.stack.is_empty() {
            self.doc.push_top_level(TopLevel::Aux(aux));
        } else {
            self.pending.push(aux);
        }
    }

    fn run(mut self) -> Result<GlueDocument, ParseError> {
        let mut rest = self.source;

        while !rest.is_empty() {
            let token = rest;
            if rest.starts_with("<!--") {
                let text = parse_comment
                    .parse_next(&mut rest)
                    .map_err(|_| self.error("unterminated comment", token))?;
                self.push_aux(GlueAux::Comment(text.to_string()));
            } else if rest.starts_with("<![CDATA[") {
                let raw = parse_cdata
                    .parse_next(&mut rest)
                    .map_err(|_| self.error("unterminated CDATA section", token))?;
                if self.stack.is_empty() {
                    return Err(self.error("CDATA outside the root element", token));
                }
                self.push_aux(GlueAux::Characters(raw.to_string()));
            } else if rest.starts_with("<?") {
                let (target, data) = parse_instruction
                    .parse_next(&mut rest)
                    .map_err(|_| self.error("malformed processing instruction", token))?;
                self.push_aux(GlueAux::Instruction {
                    target: target.to_string(),
                    data: data.to_string(),
                });
            } else if rest.starts_with("<!") {
                return Err(self.error("document type declarations are not supported", token));
            } else if rest.starts_with("</") {
                let name = parse_end_tag
                    .parse_next(&mut rest)
                    .map_err(|_| self.error("malformed end tag", token))?;
                self.close_element(name, token)?;
            } else if rest.starts_with('<') {
                let tag = parse_start_tag
                    .parse_next(&mut rest)
                    .map_err(|_| self.error("malformed start tag", token))?;
                self.open_element(tag, token)?;
            } else {
                let text = parse_characters
                    .parse_next(&mut rest)
                    .map_err(|_| self.error("unexpected input", token))?;
                if self.stack.is_empty() && !text.chars().all(char::is_whitespace) {
                    return Err(self.error("text outside the root element", token));
                }
                self.push_aux(GlueAux::Characters(text.to_string()));
            }
        }

        if let Some(open) = self.stack.last() {
            let element = self.doc.element(*open);
            return Err(ParseError::new(
                format!("unclosed element <{}>", element.tag),
                element.position.unwrap_or_default(),
            ));
        }
        Ok(self.doc)
    }

    fn open_element(&mut self, tag: StartTag<'_>, token: &str) -> Result<(), ParseError> {
        let mut attributes: SmallVec<[GlueAttribute; 4]> = SmallVec::new();
        for (name, raw) in &tag.attributes {
            if attributes.iter().any(|a| a.name == *name) {
                return Err(self.error(format!("duplicate attribute `{name}`"), token));
            }
            attributes.push(GlueAttribute {
                name: name.to_string(),
                value: unescape(raw),
            });
        }

        let position = self.position(token);
        let front = std::mem::take(&mut self.pending);
        let id = self
            .doc
            .add_parsed_element(tag.name, attributes, front, position);

        match self.stack.last() {
            Some(parent) => self.doc.link_parsed_child(*parent, id),
            None => {
                if self.main_seen {
                    return Err(self.error("more than one root element", token));
                }
                self.main_seen = true;
                self.doc.push_top_level(TopLevel::Main(id));
            }
        }

        if !tag.self_closing {
            self.stack.push(id);
        }
        Ok(())
    }

    fn close_element(&mut self, name: &str, token: &str) -> Result<(), ParseError> {
        let Some(open) = self.stack.pop() else {
            return Err(self.error(format!("unexpected end tag </{name}>"), token));
        };
        let expected = self.doc.element(open).tag.clone();
        if expected != name {
            return Err(self.error(
                format!("mismatched end tag </{name}>, expected </{expected}>"),
                token,
            ));
        }
        let trailing = std::mem::take(&mut self.pending);
        let element = self.doc.element_mut(open);
        if element.children().is_empty() {
            element.content = trailing;
        } else {
            element.tail = trailing;
        }
        Ok(())
    }
}

// ─── Token parsers ──────────────────────────────────────────────────────

struct StartTag<'a> {
    name: &'a str,
    attributes: Vec<(&'a str, &'a str)>,
    self_closing: bool,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

fn parse_name<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., is_name_char).parse_next(input)
}

/// Consume optional whitespace (concrete error type avoids inference issues).
fn skip_space(input: &mut &str) {
    let _: Result<&str, winnow::error::ErrMode<ContextError>> = multispace0.parse_next(input);
}

fn parse_comment<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    delimited("<!--", take_until(0.., "-->"), "-->").parse_next(input)
}

/// Returns the whole section, markers included, so it is written back as is.
fn parse_cdata<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    let start = *input;
    let _ = "<![CDATA[".parse_next(input)?;
    let _ = take_until(0.., "]]>").parse_next(input)?;
    let _ = "]]>".parse_next(input)?;
    Ok(&start[..start.len() - input.len()])
}

fn parse_instruction<'a>(input: &mut &'a str) -> ModalResult<(&'a str, &'a str)> {
    let _ = "<?".parse_next(input)?;
    let target = parse_name.parse_next(input)?;
    let data = take_until(0.., "?>").parse_next(input)?;
    let _ = "?>".parse_next(input)?;
    Ok((target, data.trim_start()))
}

fn parse_quoted<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    alt((
        delimited('"', take_till(0.., '"'), '"'),
        delimited('\'', take_till(0.., '\''), '\''),
    ))
    .parse_next(input)
}

fn parse_start_tag<'a>(input: &mut &'a str) -> ModalResult<StartTag<'a>> {
    let _ = '<'.parse_next(input)?;
    let name = parse_name.parse_next(input)?;
    let mut attributes = Vec::new();
    loop {
        skip_space(input);
        if let Some(after) = input.strip_prefix("/>") {
            *input = after;
            return Ok(StartTag {
                name,
                attributes,
                self_closing: true,
            });
        }
        if let Some(after) = input.strip_prefix('>') {
            *input = after;
            return Ok(StartTag {
                name,
                attributes,
                self_closing: false,
            });
        }
        let attr_name = parse_name.parse_next(input)?;
        skip_space(input);
        let _ = '='.parse_next(input)?;
        skip_space(input);
        let value = parse_quoted.parse_next(input)?;
        attributes.push((attr_name, value));
    }
}

fn parse_end_tag<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    let _ = "</".parse_next(input)?;
    let name = parse_name.parse_next(input)?;
    skip_space(input);
    let _ = '>'.parse_next(input)?;
    Ok(name)
}

fn parse_characters<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_till(1.., '<').parse_next(input)
}
