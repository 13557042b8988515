//! # Parser
//!
//! Recursive-descent parser over the preprocessed token stream. Directives
//! dispatch through a handler registry; anything unexpected produces a
//! diagnostic and recovery advances to the next newline so one run reports
//! as many problems as possible.

use crate::compiler::ast::{AstNode, FormalParam, ParamMode, PlacementComponent, ProcedureNode};
use crate::compiler::diagnostics::Diagnostics;
use crate::compiler::token::{Token, TokenKind};
use crate::runtime::molecule::MoleculeType;
use std::collections::HashMap;
use std::sync::OnceLock;

type DirectiveHandler = fn(&mut Parser, Token) -> Option<AstNode>;

fn directive_registry() -> &'static HashMap<&'static str, DirectiveHandler> {
    static REGISTRY: OnceLock<HashMap<&'static str, DirectiveHandler>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut handlers: HashMap<&'static str, DirectiveHandler> = HashMap::new();
        handlers.insert("DEFINE", parse_define);
        handlers.insert("REG", parse_reg);
        handlers.insert("PREG", parse_preg);
        handlers.insert("ORG", parse_org);
        handlers.insert("DIR", parse_dir);
        handlers.insert("PROC", parse_proc);
        handlers.insert("SCOPE", parse_scope);
        handlers.insert("REQUIRE", parse_require);
        handlers.insert("IMPORT", parse_import);
        handlers.insert("PLACE", parse_place);
        handlers.insert("PUSH_CTX", parse_push_ctx);
        handlers.insert("POP_CTX", parse_pop_ctx);
        handlers
    })
}

/// Parse a token stream into a list of AST nodes.
pub fn parse(tokens: Vec<Token>, diags: &mut Diagnostics) -> Vec<AstNode> {
    Parser::new(tokens, diags).parse_program()
}

pub struct Parser<'d> {
    tokens: Vec<Token>,
    pos: usize,
    diags: &'d mut Diagnostics,
}

impl<'d> Parser<'d> {
    fn new(tokens: Vec<Token>, diags: &'d mut Diagnostics) -> Self {
        Parser {
            tokens,
            pos: 0,
            diags,
        }
    }

    fn parse_program(&mut self) -> Vec<AstNode> {
        self.parse_block(None)
    }

    /// Parse statements until `terminator` (a directive name) or end of input.
    fn parse_block(&mut self, terminator: Option<&str>) -> Vec<AstNode> {
        let mut nodes = Vec::new();
        loop {
            self.skip_newlines();
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Eof => {
                    if let Some(term) = terminator {
                        self.diags
                            .error(format!("unterminated block, expected .{term}"), token.source);
                    }
                    return nodes;
                }
                TokenKind::Directive => {
                    let name = token.directive_name();
                    if terminator == Some(name.as_str()) {
                        self.advance();
                        return nodes;
                    }
                    self.advance();
                    match name.as_str() {
                        "ENDP" | "ENDS" => {
                            self.diags
                                .error(format!("unmatched .{name}"), token.source);
                            self.recover_to_newline();
                        }
                        "INCLUDE" => {
                            self.diags
                                .error("unexpanded .INCLUDE reached the parser", token.source);
                            self.recover_to_newline();
                        }
                        _ => match directive_registry().get(name.as_str()) {
                            Some(handler) => {
                                if let Some(node) = handler(self, token) {
                                    nodes.push(node);
                                } else {
                                    self.recover_to_newline();
                                }
                            }
                            None => {
                                self.diags
                                    .error(format!("unknown directive .{name}"), token.source);
                                self.recover_to_newline();
                            }
                        },
                    }
                }
                TokenKind::Identifier if self.peek_at(1).kind == TokenKind::Colon => {
                    let name = self.advance();
                    self.advance(); // colon
                    nodes.push(AstNode::Label {
                        source: name.source.clone(),
                        name,
                    });
                }
                TokenKind::Opcode => {
                    if let Some(node) = self.parse_instruction() {
                        nodes.push(node);
                    } else {
                        self.recover_to_newline();
                    }
                }
                _ => {
                    self.diags.error(
                        format!("unexpected token '{}'", token.text),
                        token.source,
                    );
                    self.advance();
                    self.recover_to_newline();
                }
            }
        }
    }

    fn parse_instruction(&mut self) -> Option<AstNode> {
        let opcode = self.advance();
        let is_call = opcode.upper() == "CALL";
        let mut operands = Vec::new();
        let mut ref_actuals = Vec::new();
        let mut val_actuals = Vec::new();

        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Newline | TokenKind::Eof => break,
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::Identifier if is_call && token.is_keyword("REF") => {
                    self.advance();
                    self.parse_actual_list(&mut ref_actuals)?;
                }
                TokenKind::Identifier if is_call && token.is_keyword("VAL") => {
                    self.advance();
                    self.parse_actual_list(&mut val_actuals)?;
                }
                _ => operands.push(self.parse_operand()?),
            }
        }

        Some(AstNode::Instruction {
            source: opcode.source.clone(),
            opcode,
            operands,
            ref_actuals,
            val_actuals,
        })
    }

    /// Actuals after `REF` / `VAL`, up to the next keyword or end of line.
    fn parse_actual_list(&mut self, into: &mut Vec<AstNode>) -> Option<()> {
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Newline | TokenKind::Eof => return Some(()),
                TokenKind::Identifier if token.is_keyword("REF") || token.is_keyword("VAL") => {
                    return Some(());
                }
                TokenKind::Comma => {
                    self.advance();
                }
                _ => into.push(self.parse_operand()?),
            }
        }
    }

    /// One operand: register, number, vector, typed literal, or identifier.
    fn parse_operand(&mut self) -> Option<AstNode> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Register => {
                self.advance();
                Some(AstNode::Register {
                    source: token.source.clone(),
                    name: token,
                })
            }
            TokenKind::Number => {
                if self.peek_at(1).kind == TokenKind::VectorSep {
                    self.parse_vector()
                } else {
                    self.advance();
                    Some(AstNode::NumberLiteral {
                        value: token.value.unwrap_or(0),
                        source: token.source,
                    })
                }
            }
            TokenKind::Identifier => {
                let is_type = MoleculeType::parse(&token.text).is_some();
                if is_type && self.peek_at(1).kind == TokenKind::Colon {
                    self.advance();
                    self.advance(); // colon
                    let value = self.expect(TokenKind::Number, "typed literal value")?;
                    Some(AstNode::TypedLiteral {
                        source: token.source.clone(),
                        type_name: token,
                        value: value.value.unwrap_or(0),
                    })
                } else {
                    self.advance();
                    Some(AstNode::LabelRef {
                        source: token.source.clone(),
                        name: token,
                    })
                }
            }
            _ => {
                self.diags.error(
                    format!("expected operand, found '{}'", token.text),
                    token.source,
                );
                None
            }
        }
    }

    /// Vector literal: `int ( '|' int )*`; a single number is a 1-component vector.
    fn parse_vector(&mut self) -> Option<AstNode> {
        let first = self.expect(TokenKind::Number, "vector component")?;
        let source = first.source.clone();
        let mut components = vec![first.value.unwrap_or(0)];
        while self.peek().kind == TokenKind::VectorSep {
            self.advance();
            let next = self.expect(TokenKind::Number, "vector component")?;
            components.push(next.value.unwrap_or(0));
        }
        Some(AstNode::VectorLiteral { components, source })
    }

    // ------------------------------------------------------------------
    // Token cursor
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        let token = self.peek().clone();
        if token.kind == kind {
            Some(self.advance())
        } else {
            self.diags.error(
                format!("expected {what}, found '{}'", token.text),
                token.source,
            );
            None
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Option<Token> {
        let token = self.peek().clone();
        if token.is_keyword(keyword) {
            Some(self.advance())
        } else {
            self.diags.error(
                format!("expected {keyword}, found '{}'", token.text),
                token.source,
            );
            None
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek().kind == TokenKind::Newline {
            self.advance();
        }
    }

    fn recover_to_newline(&mut self) {
        while !matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
            self.advance();
        }
    }
}

// ----------------------------------------------------------------------
// Directive handlers
// ----------------------------------------------------------------------

fn parse_define(p: &mut Parser, directive: Token) -> Option<AstNode> {
    let name = p.expect(TokenKind::Identifier, "constant name")?;
    let value = p.parse_operand()?;
    Some(AstNode::Define {
        name,
        value: Box::new(value),
        source: directive.source,
    })
}

fn parse_reg(p: &mut Parser, directive: Token) -> Option<AstNode> {
    let alias = p.expect(TokenKind::Identifier, "alias name")?;
    let register = p.expect(TokenKind::Register, "register")?;
    Some(AstNode::Reg {
        alias,
        register,
        proc_only: false,
        source: directive.source,
    })
}

fn parse_preg(p: &mut Parser, directive: Token) -> Option<AstNode> {
    let alias = p.expect(TokenKind::Identifier, "alias name")?;
    let register = p.expect(TokenKind::Register, "register")?;
    Some(AstNode::Reg {
        alias,
        register,
        proc_only: true,
        source: directive.source,
    })
}

fn parse_org(p: &mut Parser, directive: Token) -> Option<AstNode> {
    let position = p.parse_vector()?;
    Some(AstNode::Org {
        position: Box::new(position),
        source: directive.source,
    })
}

fn parse_dir(p: &mut Parser, directive: Token) -> Option<AstNode> {
    let direction = p.parse_vector()?;
    Some(AstNode::Dir {
        direction: Box::new(direction),
        source: directive.source,
    })
}

fn parse_proc(p: &mut Parser, directive: Token) -> Option<AstNode> {
    let name = p.expect(TokenKind::Identifier, "procedure name")?;
    let mut exported = false;
    let mut params = Vec::new();
    let mut mode: Option<ParamMode> = None;

    loop {
        let token = p.peek().clone();
        // the header keywords are also accepted in directive form (.EXPORT)
        let keyword = match token.kind {
            TokenKind::Identifier => Some(token.upper()),
            TokenKind::Directive => Some(token.directive_name()),
            _ => None,
        };
        match token.kind {
            TokenKind::Newline | TokenKind::Eof => break,
            _ if keyword.as_deref() == Some("EXPORT") => {
                p.advance();
                exported = true;
            }
            _ if keyword.as_deref() == Some("WITH") => {
                p.advance();
            }
            _ if keyword.as_deref() == Some("REF") => {
                p.advance();
                mode = Some(ParamMode::Ref);
            }
            _ if keyword.as_deref() == Some("VAL") => {
                p.advance();
                mode = Some(ParamMode::Val);
            }
            TokenKind::Identifier => {
                p.advance();
                match mode {
                    Some(mode) => params.push(FormalParam { name: token, mode }),
                    None => {
                        p.diags.error(
                            format!("parameter '{}' before REF or VAL", token.text),
                            token.source,
                        );
                    }
                }
            }
            _ => {
                p.diags.error(
                    format!("unexpected token '{}' in procedure header", token.text),
                    token.source,
                );
                p.recover_to_newline();
                break;
            }
        }
    }

    let body = p.parse_block(Some("ENDP"));
    Some(AstNode::Procedure(ProcedureNode {
        name,
        exported,
        params,
        body,
        source: directive.source,
    }))
}

fn parse_scope(p: &mut Parser, directive: Token) -> Option<AstNode> {
    let name = p.expect(TokenKind::Identifier, "scope name")?;
    let body = p.parse_block(Some("ENDS"));
    Some(AstNode::Scope {
        name,
        body,
        source: directive.source,
    })
}

fn parse_require(p: &mut Parser, directive: Token) -> Option<AstNode> {
    let path = p.expect(TokenKind::StringLit, "required file path")?;
    p.expect_keyword("AS")?;
    let alias = p.expect(TokenKind::Identifier, "alias name")?;
    Some(AstNode::Require {
        path,
        alias,
        source: directive.source,
    })
}

fn parse_import(p: &mut Parser, directive: Token) -> Option<AstNode> {
    let target = p.expect(TokenKind::Identifier, "imported name")?;
    p.expect_keyword("AS")?;
    let alias = p.expect(TokenKind::Identifier, "alias name")?;
    Some(AstNode::Import {
        target,
        alias,
        source: directive.source,
    })
}

fn parse_place(p: &mut Parser, directive: Token) -> Option<AstNode> {
    let molecule = p.parse_operand()?;
    if !matches!(molecule, AstNode::TypedLiteral { .. }) {
        p.diags.error(
            "expected a typed literal such as STRUCTURE:1",
            molecule.source().clone(),
        );
        return None;
    }

    let mut components = vec![parse_placement_component(p)?];
    while p.peek().kind == TokenKind::VectorSep {
        p.advance();
        components.push(parse_placement_component(p)?);
    }

    Some(AstNode::Place {
        molecule: Box::new(molecule),
        components,
        source: directive.source,
    })
}

fn parse_placement_component(p: &mut Parser) -> Option<PlacementComponent> {
    let token = p.peek().clone();
    match token.kind {
        TokenKind::Number => {
            p.advance();
            let lo = token.value.unwrap_or(0);
            if p.peek().kind == TokenKind::DotDot {
                p.advance();
                let hi = p.expect(TokenKind::Number, "range end")?;
                Some(PlacementComponent::Range(lo, hi.value.unwrap_or(0)))
            } else {
                Some(PlacementComponent::Scalar(lo))
            }
        }
        TokenKind::Identifier if token.text == "*" => {
            p.advance();
            Some(PlacementComponent::Wildcard)
        }
        _ => {
            p.diags.error(
                format!("expected placement component, found '{}'", token.text),
                token.source,
            );
            None
        }
    }
}

fn parse_push_ctx(_p: &mut Parser, directive: Token) -> Option<AstNode> {
    Some(AstNode::PushCtx {
        source: directive.source,
    })
}

fn parse_pop_ctx(_p: &mut Parser, directive: Token) -> Option<AstNode> {
    Some(AstNode::PopCtx {
        source: directive.source,
    })
}
