//! Recursive-descent parser.
//!
//! The parser owns a token buffer and appends nodes to the shared
//! [`NodeArena`], stamping every node with its owning module and the
//! declaration context in effect at construction time. Errors never abort a
//! module: the parser reports a diagnostic, synthesizes an `Invalid*` node,
//! and resynchronizes at the next statement boundary.

use crate::ast::*;
use aven_common::{codes, Diagnostic, Span};
use aven_scanner::{decode_string_literal, Scanner, Token, TokenKind};

pub struct Parser<'a, 'src> {
    file: String,
    src: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    module: ModuleId,
    arena: &'a mut NodeArena,
    ctx: Vec<NodeId>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a, 'src> Parser<'a, 'src> {
    /// Parse one module's source text into the arena. Returns the module
    /// node and every scan/parse diagnostic.
    pub fn parse_module(
        arena: &'a mut NodeArena,
        module: ModuleId,
        name: &str,
        source: &'src str,
    ) -> (NodeId, Vec<Diagnostic>) {
        let (tokens, scan_diags) = Scanner::new(name, source).scan_all();
        let mut parser = Parser {
            file: name.to_string(),
            src: source,
            tokens,
            pos: 0,
            module,
            arena,
            ctx: Vec::new(),
            diagnostics: scan_diags,
        };
        let root = parser.run(name);
        (root, parser.diagnostics)
    }

    fn run(&mut self, name: &str) -> NodeId {
        let root = self.arena.alloc(Node {
            span: Span::new(0, self.src.len() as u32),
            module: self.module,
            decl_ctx: None,
            kind: NodeKind::Module(ModuleDecl {
                name: name.to_string(),
                stmts: Vec::new(),
            }),
        });
        self.ctx.push(root);
        let mut stmts = Vec::new();
        while !self.at(TokenKind::Eof) {
            let before = self.pos;
            if let Some(stmt) = self.parse_stmt() {
                stmts.push(stmt);
            }
            if self.pos == before {
                // Did not consume anything; skip the offending token so the
                // loop always advances.
                self.pos += 1;
            }
        }
        self.ctx.pop();
        if let NodeKind::Module(m) = &mut self.arena.get_mut(root).kind {
            m.stmts = stmts;
        }
        root
    }

    // -----------------------------------------------------------------------
    // Token plumbing
    // -----------------------------------------------------------------------

    fn peek(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn bump(&mut self) -> Token {
        let tok = self.peek();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        if let Some(tok) = self.eat(kind) {
            Some(tok)
        } else {
            let found = self.peek();
            self.error(
                found.span,
                format!("expected {}, found {}", kind.describe(), found.kind.describe()),
                codes::UNEXPECTED_TOKEN,
            );
            None
        }
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            Span::at(0)
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    fn error(&mut self, span: Span, message: impl Into<String>, code: u32) {
        self.diagnostics
            .push(Diagnostic::error(self.file.clone(), span, message, code));
    }

    fn binding_op(&mut self) -> Option<BindingOp> {
        match self.peek_kind() {
            TokenKind::CopyBind => {
                self.bump();
                Some(BindingOp::Copy)
            }
            TokenKind::RefBind => {
                self.bump();
                Some(BindingOp::Reference)
            }
            TokenKind::MoveBind => {
                self.bump();
                Some(BindingOp::Move)
            }
            _ => None,
        }
    }

    fn alloc(&mut self, span: Span, kind: NodeKind) -> NodeId {
        self.arena.alloc(Node {
            span,
            module: self.module,
            decl_ctx: self.ctx.last().copied(),
            kind,
        })
    }

    fn ident_text(&self, tok: Token) -> String {
        tok.text(self.src).to_string()
    }

    // -----------------------------------------------------------------------
    // Statements and declarations
    // -----------------------------------------------------------------------

    fn parse_stmt(&mut self) -> Option<NodeId> {
        while self.eat(TokenKind::Semicolon).is_some() {}
        match self.peek_kind() {
            TokenKind::Eof | TokenKind::RBrace => None,
            TokenKind::Let | TokenKind::Var => Some(self.parse_prop_decl()),
            TokenKind::Fun if self.peek_kind_at(1) == TokenKind::LParen => {
                // Anonymous function in expression position.
                self.parse_expr_stmt()
            }
            TokenKind::Fun => Some(self.parse_fun_decl(false)),
            TokenKind::Mutating => {
                let tok = self.bump();
                if self.at(TokenKind::Fun) {
                    Some(self.parse_fun_decl(true))
                } else {
                    self.error(
                        tok.span,
                        "'mutating' must precede a function declaration",
                        codes::EXPECTED_DECLARATION,
                    );
                    None
                }
            }
            TokenKind::Struct | TokenKind::Union | TokenKind::Interface => {
                Some(self.parse_nominal_decl())
            }
            TokenKind::Extension => Some(self.parse_extension_decl()),
            TokenKind::LBrace => Some(self.parse_brace_stmt()),
            TokenKind::If => Some(self.parse_if_stmt()),
            TokenKind::While => Some(self.parse_while_stmt()),
            TokenKind::Return => Some(self.parse_return_stmt()),
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_expr_stmt(&mut self) -> Option<NodeId> {
        let expr = self.parse_expr();
        if let Some(op) = self.binding_op() {
            let rvalue = self.parse_expr();
            let span = self.arena.get(expr).span.merge(self.arena.get(rvalue).span);
            return Some(self.alloc(
                span,
                NodeKind::Binding(BindingStmt {
                    op,
                    lvalue: expr,
                    rvalue,
                }),
            ));
        }
        Some(expr)
    }

    fn parse_prop_decl(&mut self) -> NodeId {
        let intro = self.bump();
        let mutable = intro.kind == TokenKind::Var;
        let name = match self.expect(TokenKind::Ident) {
            Some(tok) => self.ident_text(tok),
            None => String::from("<error>"),
        };
        let sign = if self.eat(TokenKind::Colon).is_some() {
            Some(self.parse_qual_sign())
        } else {
            None
        };
        let (op, initializer) = match self.binding_op() {
            Some(op) => (Some(op), Some(self.parse_expr())),
            None => (None, None),
        };
        let span = intro.span.merge(self.prev_span());
        self.alloc(
            span,
            NodeKind::Prop(PropDecl {
                name,
                mutable,
                sign,
                op,
                initializer,
            }),
        )
    }

    /// Function name position accepts identifiers and operator tokens
    /// (`fun + (rhs: Int) -> Int`).
    fn parse_fun_name(&mut self) -> String {
        if let Some(tok) = self.eat(TokenKind::Ident) {
            return self.ident_text(tok);
        }
        if let Some(name) = self.peek_kind().operator_name() {
            self.bump();
            return name.to_string();
        }
        let found = self.peek();
        self.error(
            found.span,
            format!("expected function name, found {}", found.kind.describe()),
            codes::UNEXPECTED_TOKEN,
        );
        String::from("<error>")
    }

    fn in_type_body(&self) -> bool {
        self.ctx.last().is_some_and(|&ctx| {
            matches!(
                self.arena.get(ctx).kind,
                NodeKind::Nominal(_) | NodeKind::BuiltinType(_) | NodeKind::Extension(_)
            )
        })
    }

    fn parse_fun_decl(&mut self, mutating: bool) -> NodeId {
        let intro = self.bump(); // `fun`
        let name = self.parse_fun_name();
        let kind = if self.in_type_body() {
            match name.as_str() {
                "new" => FunKind::Constructor,
                "del" => FunKind::Destructor,
                _ => FunKind::Method,
            }
        } else {
            FunKind::Regular
        };

        let fun = self.alloc(
            intro.span,
            NodeKind::Fun(FunDecl {
                name,
                kind,
                mutating,
                placeholders: Vec::new(),
                params: Vec::new(),
                codom: None,
                body: None,
                self_decl: None,
            }),
        );
        self.ctx.push(fun);

        let placeholders = if self.at(TokenKind::Lt) {
            self.parse_generic_params()
        } else {
            Vec::new()
        };

        let mut params = Vec::new();
        if self.expect(TokenKind::LParen).is_some() {
            params = self.parse_param_decls();
        }

        let codom = if self.eat(TokenKind::Arrow).is_some() {
            Some(self.parse_qual_sign())
        } else {
            None
        };

        let body = if self.at(TokenKind::LBrace) {
            Some(self.parse_brace_stmt())
        } else {
            None
        };

        self.ctx.pop();
        let span = intro.span.merge(self.prev_span());
        let node = self.arena.get_mut(fun);
        node.span = span;
        if let NodeKind::Fun(f) = &mut node.kind {
            f.placeholders = placeholders;
            f.params = params;
            f.codom = codom;
            f.body = body;
        }
        fun
    }

    fn parse_generic_params(&mut self) -> Vec<NodeId> {
        let mut placeholders = Vec::new();
        self.bump(); // `<`
        loop {
            match self.eat(TokenKind::Ident) {
                Some(tok) => {
                    let name = self.ident_text(tok);
                    placeholders.push(
                        self.alloc(tok.span, NodeKind::GenericParam(GenericParamDecl { name })),
                    );
                }
                None => break,
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::Gt);
        placeholders
    }

    fn parse_param_decls(&mut self) -> Vec<NodeId> {
        let mut params = Vec::new();
        if self.eat(TokenKind::RParen).is_some() {
            return params;
        }
        loop {
            params.push(self.parse_param_decl());
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen);
        params
    }

    fn parse_param_decl(&mut self) -> NodeId {
        let first = self.peek();
        let (label, name, start) = if first.kind == TokenKind::Ident
            && self.peek_kind_at(1) == TokenKind::Ident
        {
            let label_tok = self.bump();
            let name_tok = self.bump();
            (
                Some(self.ident_text(label_tok)),
                self.ident_text(name_tok),
                label_tok.span,
            )
        } else if let Some(tok) = self.eat(TokenKind::Ident) {
            (None, self.ident_text(tok), tok.span)
        } else {
            self.error(
                first.span,
                format!("expected parameter name, found {}", first.kind.describe()),
                codes::UNEXPECTED_TOKEN,
            );
            (None, String::from("<error>"), first.span)
        };

        let sign = if self.eat(TokenKind::Colon).is_some() {
            Some(self.parse_qual_sign())
        } else {
            None
        };
        let default = self.binding_op().map(|_| self.parse_expr());
        let span = start.merge(self.prev_span());
        self.alloc(
            span,
            NodeKind::Param(ParamDecl {
                label,
                name,
                sign,
                default,
            }),
        )
    }

    fn parse_nominal_decl(&mut self) -> NodeId {
        let intro = self.bump();
        let kind = match intro.kind {
            TokenKind::Struct => NominalKind::Struct,
            TokenKind::Union => NominalKind::Union,
            _ => NominalKind::Interface,
        };
        let name = match self.expect(TokenKind::Ident) {
            Some(tok) => self.ident_text(tok),
            None => String::from("<error>"),
        };

        let nominal = self.alloc(
            intro.span,
            NodeKind::Nominal(NominalDecl {
                kind,
                name,
                placeholders: Vec::new(),
                conformances: Vec::new(),
                members: Vec::new(),
            }),
        );
        self.ctx.push(nominal);

        let placeholders = if self.at(TokenKind::Lt) {
            self.parse_generic_params()
        } else {
            Vec::new()
        };

        let mut conformances = Vec::new();
        if self.eat(TokenKind::Colon).is_some() {
            loop {
                conformances.push(self.parse_ident_sign());
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }

        let members = self.parse_member_block();

        self.ctx.pop();
        let span = intro.span.merge(self.prev_span());
        let node = self.arena.get_mut(nominal);
        node.span = span;
        if let NodeKind::Nominal(n) = &mut node.kind {
            n.placeholders = placeholders;
            n.conformances = conformances;
            n.members = members;
        }
        nominal
    }

    fn parse_extension_decl(&mut self) -> NodeId {
        let intro = self.bump();
        let extension = self.alloc(
            intro.span,
            NodeKind::Extension(ExtensionDecl {
                extended: NodeId(0),
                members: Vec::new(),
            }),
        );
        self.ctx.push(extension);
        let extended = self.parse_ident_sign();
        let members = self.parse_member_block();
        self.ctx.pop();

        let span = intro.span.merge(self.prev_span());
        let node = self.arena.get_mut(extension);
        node.span = span;
        if let NodeKind::Extension(e) = &mut node.kind {
            e.extended = extended;
            e.members = members;
        }
        extension
    }

    fn parse_member_block(&mut self) -> Vec<NodeId> {
        let mut members = Vec::new();
        if self.expect(TokenKind::LBrace).is_none() {
            return members;
        }
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            while self.eat(TokenKind::Semicolon).is_some() {}
            let before = self.pos;
            match self.peek_kind() {
                TokenKind::Let | TokenKind::Var => members.push(self.parse_prop_decl()),
                TokenKind::Fun => members.push(self.parse_fun_decl(false)),
                TokenKind::Mutating => {
                    self.bump();
                    if self.at(TokenKind::Fun) {
                        members.push(self.parse_fun_decl(true));
                    }
                }
                TokenKind::Struct | TokenKind::Union | TokenKind::Interface => {
                    members.push(self.parse_nominal_decl());
                }
                TokenKind::RBrace | TokenKind::Eof => break,
                _ => {
                    let found = self.peek();
                    self.error(
                        found.span,
                        format!("expected member declaration, found {}", found.kind.describe()),
                        codes::EXPECTED_DECLARATION,
                    );
                }
            }
            if self.pos == before {
                self.pos += 1;
            }
        }
        self.expect(TokenKind::RBrace);
        members
    }

    fn parse_brace_stmt(&mut self) -> NodeId {
        let open = self.bump(); // `{`
        let brace = self.alloc(open.span, NodeKind::Brace(BraceStmt { stmts: Vec::new() }));
        self.ctx.push(brace);
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let before = self.pos;
            if let Some(stmt) = self.parse_stmt() {
                stmts.push(stmt);
            }
            if self.pos == before {
                self.pos += 1;
            }
        }
        self.expect(TokenKind::RBrace);
        self.ctx.pop();

        let span = open.span.merge(self.prev_span());
        let node = self.arena.get_mut(brace);
        node.span = span;
        if let NodeKind::Brace(b) = &mut node.kind {
            b.stmts = stmts;
        }
        brace
    }

    fn parse_if_stmt(&mut self) -> NodeId {
        let intro = self.bump();
        let condition = self.parse_expr();
        let then_body = if self.at(TokenKind::LBrace) {
            self.parse_brace_stmt()
        } else {
            let span = self.peek().span;
            self.error(span, "expected '{' after condition", codes::UNEXPECTED_TOKEN);
            self.alloc(span, NodeKind::Brace(BraceStmt { stmts: Vec::new() }))
        };
        let else_body = if self.eat(TokenKind::Else).is_some() {
            if self.at(TokenKind::If) {
                Some(self.parse_if_stmt())
            } else if self.at(TokenKind::LBrace) {
                Some(self.parse_brace_stmt())
            } else {
                let span = self.peek().span;
                self.error(span, "expected '{' or 'if' after 'else'", codes::UNEXPECTED_TOKEN);
                None
            }
        } else {
            None
        };
        let span = intro.span.merge(self.prev_span());
        self.alloc(
            span,
            NodeKind::If(IfStmt {
                condition,
                then_body,
                else_body,
            }),
        )
    }

    fn parse_while_stmt(&mut self) -> NodeId {
        let intro = self.bump();
        let condition = self.parse_expr();
        let body = if self.at(TokenKind::LBrace) {
            self.parse_brace_stmt()
        } else {
            let span = self.peek().span;
            self.error(span, "expected '{' after condition", codes::UNEXPECTED_TOKEN);
            self.alloc(span, NodeKind::Brace(BraceStmt { stmts: Vec::new() }))
        };
        let span = intro.span.merge(self.prev_span());
        self.alloc(span, NodeKind::While(WhileStmt { condition, body }))
    }

    fn parse_return_stmt(&mut self) -> NodeId {
        let intro = self.bump();
        let op = self.binding_op();
        let value = if self.starts_expr() {
            Some(self.parse_expr())
        } else {
            None
        };
        let span = intro.span.merge(self.prev_span());
        self.alloc(span, NodeKind::Return(ReturnStmt { op, value }))
    }

    fn starts_expr(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Ident
                | TokenKind::IntLit
                | TokenKind::FloatLit
                | TokenKind::StringLit
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Dot
                | TokenKind::Minus
                | TokenKind::Plus
                | TokenKind::Bang
                | TokenKind::Fun
        )
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    pub(crate) fn parse_expr(&mut self) -> NodeId {
        let mut expr = self.parse_binary(1);
        loop {
            match self.peek_kind() {
                TokenKind::As => {
                    self.bump();
                    let sign = self.parse_qual_sign();
                    let span = self.arena.get(expr).span.merge(self.prev_span());
                    expr = self.alloc(
                        span,
                        NodeKind::Cast(CastExpr {
                            operand: expr,
                            sign,
                            forced: false,
                        }),
                    );
                }
                TokenKind::AsBang => {
                    self.bump();
                    let sign = self.parse_qual_sign();
                    let span = self.arena.get(expr).span.merge(self.prev_span());
                    expr = self.alloc(
                        span,
                        NodeKind::Cast(CastExpr {
                            operand: expr,
                            sign,
                            forced: true,
                        }),
                    );
                }
                TokenKind::Is => {
                    self.bump();
                    let sign = self.parse_qual_sign();
                    let span = self.arena.get(expr).span.merge(self.prev_span());
                    expr = self.alloc(
                        span,
                        NodeKind::SubtypeTest(SubtypeTestExpr {
                            operand: expr,
                            sign,
                        }),
                    );
                }
                _ => return expr,
            }
        }
    }

    fn infix_precedence(kind: TokenKind) -> Option<u8> {
        Some(match kind {
            TokenKind::PipePipe => 1,
            TokenKind::AmpAmp => 2,
            TokenKind::EqEq | TokenKind::BangEq | TokenKind::EqEqEq | TokenKind::BangEqEq => 3,
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => 4,
            TokenKind::Plus | TokenKind::Minus => 5,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 6,
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> NodeId {
        let mut lhs = self.parse_prefix();
        while let Some(prec) = Self::infix_precedence(self.peek_kind()) {
            if prec < min_prec {
                break;
            }
            // `<` only continues an expression when it is not a use-site
            // specialization (handled as a postfix of the identifier).
            let op_tok = self.bump();
            let op_name = op_tok
                .kind
                .operator_name()
                .unwrap_or("<error>")
                .to_string();
            let op = self.alloc(
                op_tok.span,
                NodeKind::Ident(IdentExpr {
                    name: op_name,
                    spec_args: Vec::new(),
                    referred_decls: Vec::new(),
                }),
            );
            let rhs = self.parse_binary(prec + 1);
            let span = self.arena.get(lhs).span.merge(self.arena.get(rhs).span);
            lhs = self.alloc(span, NodeKind::Infix(InfixExpr { op, lhs, rhs }));
        }
        lhs
    }

    fn parse_prefix(&mut self) -> NodeId {
        let kind = self.peek_kind();
        if matches!(kind, TokenKind::Minus | TokenKind::Bang | TokenKind::Plus) {
            let op_tok = self.bump();
            let name = op_tok.kind.operator_name().unwrap_or("<error>").to_string();
            let op = self.alloc(
                op_tok.span,
                NodeKind::Ident(IdentExpr {
                    name,
                    spec_args: Vec::new(),
                    referred_decls: Vec::new(),
                }),
            );
            let operand = self.parse_prefix();
            let span = op_tok.span.merge(self.arena.get(operand).span);
            return self.alloc(span, NodeKind::Prefix(PrefixExpr { op, operand }));
        }
        self.parse_postfix()
    }

    /// True when the upcoming `<` opens a use-site specialization list
    /// (`<T = Int, …>`) rather than a comparison.
    fn at_spec_args(&self) -> bool {
        self.at(TokenKind::Lt)
            && self.peek_kind_at(1) == TokenKind::Ident
            && self.peek_kind_at(2) == TokenKind::Eq
    }

    fn parse_spec_args(&mut self) -> Vec<(String, NodeId)> {
        let mut args = Vec::new();
        self.bump(); // `<`
        loop {
            let Some(name_tok) = self.eat(TokenKind::Ident) else {
                break;
            };
            let name = self.ident_text(name_tok);
            self.expect(TokenKind::Eq);
            let sign = self.parse_qual_sign();
            args.push((name, sign));
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::Gt);
        args
    }

    fn parse_postfix(&mut self) -> NodeId {
        let mut expr = self.parse_primary();
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    let args = self.parse_call_args();
                    let span = self.arena.get(expr).span.merge(self.prev_span());
                    expr = self.alloc(span, NodeKind::Call(CallExpr { callee: expr, args }));
                }
                TokenKind::Dot => {
                    self.bump();
                    let ownee = self.parse_member_ident();
                    let span = self.arena.get(expr).span.merge(self.prev_span());
                    expr = self.alloc(
                        span,
                        NodeKind::Select(SelectExpr { owner: expr, ownee }),
                    );
                }
                TokenKind::Lt if self.at_spec_args() => {
                    if !matches!(self.arena.get(expr).kind, NodeKind::Ident(_)) {
                        break;
                    }
                    let args = self.parse_spec_args();
                    let end = self.prev_span();
                    let node = self.arena.get_mut(expr);
                    node.span = node.span.merge(end);
                    if let NodeKind::Ident(ident) = &mut node.kind {
                        ident.spec_args = args;
                    }
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_member_ident(&mut self) -> NodeId {
        match self.eat(TokenKind::Ident) {
            Some(tok) => {
                let name = self.ident_text(tok);
                self.alloc(
                    tok.span,
                    NodeKind::Ident(IdentExpr {
                        name,
                        spec_args: Vec::new(),
                        referred_decls: Vec::new(),
                    }),
                )
            }
            None => {
                let found = self.peek();
                self.error(
                    found.span,
                    format!("expected member name, found {}", found.kind.describe()),
                    codes::UNEXPECTED_TOKEN,
                );
                self.alloc(found.span, NodeKind::InvalidExpr)
            }
        }
    }

    fn parse_call_args(&mut self) -> Vec<NodeId> {
        let mut args = Vec::new();
        self.bump(); // `(`
        if self.eat(TokenKind::RParen).is_some() {
            return args;
        }
        loop {
            args.push(self.parse_call_arg());
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen);
        args
    }

    fn parse_call_arg(&mut self) -> NodeId {
        let start = self.peek().span;
        // `label op value` with an explicit binding operator.
        if self.at(TokenKind::Ident)
            && matches!(
                self.peek_kind_at(1),
                TokenKind::CopyBind | TokenKind::RefBind | TokenKind::MoveBind
            )
        {
            let label_tok = self.bump();
            let label = self.ident_text(label_tok);
            let op = self.binding_op();
            let value = self.parse_expr();
            let span = start.merge(self.prev_span());
            return self.alloc(
                span,
                NodeKind::CallArg(CallArgExpr {
                    label: Some(label),
                    op,
                    value,
                }),
            );
        }
        let value = self.parse_expr();
        // Tolerate an explicit operator after a non-identifier expression;
        // the value is whatever follows the operator.
        let (op, value) = match self.binding_op() {
            Some(op) => (Some(op), {
                let v = self.parse_expr();
                let span = self.arena.get(value).span;
                self.error(
                    span,
                    "argument label must be a plain identifier",
                    codes::UNEXPECTED_TOKEN,
                );
                v
            }),
            None => (None, value),
        };
        let span = start.merge(self.prev_span());
        self.alloc(span, NodeKind::CallArg(CallArgExpr { label: None, op, value }))
    }

    fn parse_primary(&mut self) -> NodeId {
        let tok = self.peek();
        match tok.kind {
            TokenKind::IntLit => {
                self.bump();
                let value = tok.text(self.src).parse::<i64>().unwrap_or(0);
                self.alloc(tok.span, NodeKind::IntLit(value))
            }
            TokenKind::FloatLit => {
                self.bump();
                let value = tok.text(self.src).parse::<f64>().unwrap_or(0.0);
                self.alloc(tok.span, NodeKind::FloatLit(value))
            }
            TokenKind::StringLit => {
                self.bump();
                let value = decode_string_literal(tok.text(self.src));
                self.alloc(tok.span, NodeKind::StringLit(value))
            }
            TokenKind::True => {
                self.bump();
                self.alloc(tok.span, NodeKind::BoolLit(true))
            }
            TokenKind::False => {
                self.bump();
                self.alloc(tok.span, NodeKind::BoolLit(false))
            }
            TokenKind::Null => {
                self.bump();
                self.alloc(tok.span, NodeKind::NullLit)
            }
            TokenKind::Ident => {
                self.bump();
                let name = self.ident_text(tok);
                self.alloc(
                    tok.span,
                    NodeKind::Ident(IdentExpr {
                        name,
                        spec_args: Vec::new(),
                        referred_decls: Vec::new(),
                    }),
                )
            }
            TokenKind::Dot => {
                self.bump();
                let ownee = self.parse_member_ident();
                let span = tok.span.merge(self.prev_span());
                self.alloc(span, NodeKind::ImplicitSelect(ImplicitSelectExpr { ownee }))
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr();
                self.expect(TokenKind::RParen);
                let span = tok.span.merge(self.prev_span());
                self.alloc(span, NodeKind::Paren(ParenExpr { inner }))
            }
            TokenKind::LBracket => self.parse_array_or_map_literal(),
            TokenKind::LBrace => self.parse_set_or_map_literal(),
            TokenKind::Fun => self.parse_lambda(),
            _ => {
                self.error(
                    tok.span,
                    format!("expected expression, found {}", tok.kind.describe()),
                    codes::EXPECTED_EXPRESSION,
                );
                if !matches!(
                    tok.kind,
                    TokenKind::RBrace | TokenKind::RParen | TokenKind::Eof | TokenKind::Semicolon
                ) {
                    self.bump();
                }
                self.alloc(tok.span, NodeKind::InvalidExpr)
            }
        }
    }

    fn parse_array_or_map_literal(&mut self) -> NodeId {
        let open = self.bump(); // `[`
        let mut elements = Vec::new();
        if self.eat(TokenKind::RBracket).is_none() {
            loop {
                elements.push(self.parse_expr());
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.expect(TokenKind::RBracket);
        }
        let span = open.span.merge(self.prev_span());
        self.alloc(span, NodeKind::ArrayLit(ArrayLitExpr { elements }))
    }

    /// `{ a, b }` is a set literal, `{ k: v }` a map literal, `{}` the empty
    /// set and `{:}` the empty map.
    fn parse_set_or_map_literal(&mut self) -> NodeId {
        let open = self.bump(); // `{`
        if self.eat(TokenKind::RBrace).is_some() {
            let span = open.span.merge(self.prev_span());
            return self.alloc(span, NodeKind::SetLit(SetLitExpr { elements: Vec::new() }));
        }
        if self.at(TokenKind::Colon) && self.peek_kind_at(1) == TokenKind::RBrace {
            self.bump();
            self.bump();
            let span = open.span.merge(self.prev_span());
            return self.alloc(span, NodeKind::MapLit(MapLitExpr { entries: Vec::new() }));
        }

        let first = self.parse_expr();
        if self.eat(TokenKind::Colon).is_some() {
            let mut entries = vec![(first, self.parse_expr())];
            while self.eat(TokenKind::Comma).is_some() {
                let key = self.parse_expr();
                self.expect(TokenKind::Colon);
                let value = self.parse_expr();
                entries.push((key, value));
            }
            self.expect(TokenKind::RBrace);
            let span = open.span.merge(self.prev_span());
            return self.alloc(span, NodeKind::MapLit(MapLitExpr { entries }));
        }

        let mut elements = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            elements.push(self.parse_expr());
        }
        self.expect(TokenKind::RBrace);
        let span = open.span.merge(self.prev_span());
        self.alloc(span, NodeKind::SetLit(SetLitExpr { elements }))
    }

    fn parse_lambda(&mut self) -> NodeId {
        let intro = self.bump(); // `fun`
        let lambda = self.alloc(
            intro.span,
            NodeKind::Lambda(LambdaExpr {
                params: Vec::new(),
                codom: None,
                body: NodeId(0),
            }),
        );
        self.ctx.push(lambda);

        let mut params = Vec::new();
        if self.expect(TokenKind::LParen).is_some() {
            params = self.parse_param_decls();
        }
        let codom = if self.eat(TokenKind::Arrow).is_some() {
            Some(self.parse_qual_sign())
        } else {
            None
        };
        let body = if self.at(TokenKind::LBrace) {
            self.parse_brace_stmt()
        } else {
            let span = self.peek().span;
            self.error(span, "expected '{' to open the lambda body", codes::UNEXPECTED_TOKEN);
            self.alloc(span, NodeKind::Brace(BraceStmt { stmts: Vec::new() }))
        };

        self.ctx.pop();
        let span = intro.span.merge(self.prev_span());
        let node = self.arena.get_mut(lambda);
        node.span = span;
        if let NodeKind::Lambda(l) = &mut node.kind {
            l.params = params;
            l.codom = codom;
            l.body = body;
        }
        lambda
    }

    // -----------------------------------------------------------------------
    // Type signatures
    // -----------------------------------------------------------------------

    pub(crate) fn parse_qual_sign(&mut self) -> NodeId {
        let start = self.peek().span;
        let mut quals = Qualifiers::empty();
        while self.at(TokenKind::At) {
            self.bump();
            match self.eat(TokenKind::Ident) {
                Some(tok) => match tok.text(self.src) {
                    "cst" => quals |= Qualifiers::CST,
                    "mut" => quals |= Qualifiers::MUT,
                    other => {
                        self.error(
                            tok.span,
                            format!("unknown qualifier '@{other}'"),
                            codes::EXPECTED_TYPE_SIGNATURE,
                        );
                    }
                },
                None => {
                    let span = self.peek().span;
                    self.error(span, "expected qualifier name after '@'", codes::EXPECTED_TYPE_SIGNATURE);
                    break;
                }
            }
        }
        let sign = self.parse_bare_sign();
        let span = start.merge(self.prev_span());
        self.alloc(span, NodeKind::QualSign(QualSign { quals, sign: Some(sign) }))
    }

    fn parse_bare_sign(&mut self) -> NodeId {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Ident => {
                let mut sign = self.parse_ident_sign();
                while self.at(TokenKind::ColonColon) {
                    self.bump();
                    let ownee = self.parse_ident_sign();
                    let span = self.arena.get(sign).span.merge(self.prev_span());
                    sign = self.alloc(
                        span,
                        NodeKind::NestedIdentSign(NestedIdentSign { owner: sign, ownee }),
                    );
                }
                sign
            }
            TokenKind::ColonColon => {
                self.bump();
                let ownee = self.parse_ident_sign();
                let span = tok.span.merge(self.prev_span());
                self.alloc(
                    span,
                    NodeKind::ImplicitNestedIdentSign(ImplicitNestedIdentSign { ownee }),
                )
            }
            TokenKind::LParen => self.parse_fun_sign(),
            _ => {
                self.error(
                    tok.span,
                    format!("expected type signature, found {}", tok.kind.describe()),
                    codes::EXPECTED_TYPE_SIGNATURE,
                );
                self.alloc(tok.span, NodeKind::InvalidSign)
            }
        }
    }

    fn parse_ident_sign(&mut self) -> NodeId {
        let tok = self.peek();
        let Some(name_tok) = self.eat(TokenKind::Ident) else {
            self.error(
                tok.span,
                format!("expected type name, found {}", tok.kind.describe()),
                codes::EXPECTED_TYPE_SIGNATURE,
            );
            return self.alloc(tok.span, NodeKind::InvalidSign);
        };
        let name = self.ident_text(name_tok);
        let spec_args = if self.at_spec_args() {
            self.parse_spec_args()
        } else {
            Vec::new()
        };
        let span = name_tok.span.merge(self.prev_span());
        self.alloc(
            span,
            NodeKind::IdentSign(IdentSign {
                name,
                spec_args,
                referred_decl: None,
            }),
        )
    }

    fn parse_fun_sign(&mut self) -> NodeId {
        let open = self.bump(); // `(`
        let mut params = Vec::new();
        if self.eat(TokenKind::RParen).is_none() {
            loop {
                params.push(self.parse_param_sign());
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.expect(TokenKind::RParen);
        }
        if self.expect(TokenKind::Arrow).is_none() {
            let span = open.span.merge(self.prev_span());
            return self.alloc(span, NodeKind::InvalidSign);
        }
        let codom = self.parse_qual_sign();
        let span = open.span.merge(self.prev_span());
        self.alloc(span, NodeKind::FunSign(FunSign { params, codom }))
    }

    fn parse_param_sign(&mut self) -> NodeId {
        let start = self.peek().span;
        let label = if self.at(TokenKind::Ident) && self.peek_kind_at(1) == TokenKind::Colon {
            let tok = self.bump();
            self.bump(); // `:`
            Some(self.ident_text(tok))
        } else {
            None
        };
        let sign = self.parse_qual_sign();
        let span = start.merge(self.prev_span());
        self.alloc(span, NodeKind::ParamSign(ParamSign { label, sign }))
    }
}
