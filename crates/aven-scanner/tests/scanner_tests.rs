use aven_scanner::{decode_string_literal, Scanner, TokenKind};

fn kinds(src: &str) -> Vec<TokenKind> {
    let (tokens, diags) = Scanner::new("test.aven", src).scan_all();
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    tokens.into_iter().map(|t| t.kind).collect()
}

#[test]
fn binding_operators() {
    assert_eq!(
        kinds("x := y  x &- y  x <- y"),
        vec![
            TokenKind::Ident,
            TokenKind::CopyBind,
            TokenKind::Ident,
            TokenKind::Ident,
            TokenKind::RefBind,
            TokenKind::Ident,
            TokenKind::Ident,
            TokenKind::MoveBind,
            TokenKind::Ident,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn move_bind_wins_over_comparison() {
    // `<-` is always the move operator; a comparison against a negated
    // operand needs a space or parentheses.
    assert_eq!(
        kinds("a <- b"),
        vec![TokenKind::Ident, TokenKind::MoveBind, TokenKind::Ident, TokenKind::Eof]
    );
    assert_eq!(
        kinds("a < - b"),
        vec![
            TokenKind::Ident,
            TokenKind::Lt,
            TokenKind::Minus,
            TokenKind::Ident,
            TokenKind::Eof
        ]
    );
}

#[test]
fn identity_operators_longest_match() {
    assert_eq!(
        kinds("a === b !== c == d != e = f"),
        vec![
            TokenKind::Ident,
            TokenKind::EqEqEq,
            TokenKind::Ident,
            TokenKind::BangEqEq,
            TokenKind::Ident,
            TokenKind::EqEq,
            TokenKind::Ident,
            TokenKind::BangEq,
            TokenKind::Ident,
            TokenKind::Eq,
            TokenKind::Ident,
            TokenKind::Eof
        ]
    );
}

#[test]
fn keywords_and_forced_cast() {
    assert_eq!(
        kinds("fun as as! is mutating extension"),
        vec![
            TokenKind::Fun,
            TokenKind::As,
            TokenKind::AsBang,
            TokenKind::Is,
            TokenKind::Mutating,
            TokenKind::Extension,
            TokenKind::Eof
        ]
    );
}

#[test]
fn qualifiers_and_signatures() {
    assert_eq!(
        kinds("@cst @mut A::B ::C -> <T = Int>"),
        vec![
            TokenKind::At,
            TokenKind::Ident,
            TokenKind::At,
            TokenKind::Ident,
            TokenKind::Ident,
            TokenKind::ColonColon,
            TokenKind::Ident,
            TokenKind::ColonColon,
            TokenKind::Ident,
            TokenKind::Arrow,
            TokenKind::Lt,
            TokenKind::Ident,
            TokenKind::Eq,
            TokenKind::Ident,
            TokenKind::Gt,
            TokenKind::Eof
        ]
    );
}

#[test]
fn numbers() {
    assert_eq!(
        kinds("0 42 1.5 1.handle"),
        vec![
            TokenKind::IntLit,
            TokenKind::IntLit,
            TokenKind::FloatLit,
            // `1.handle` is an int followed by a member select.
            TokenKind::IntLit,
            TokenKind::Dot,
            TokenKind::Ident,
            TokenKind::Eof
        ]
    );
}

#[test]
fn comments_are_trivia() {
    assert_eq!(
        kinds("let x // trailing\n/* block /* nested */ */ var"),
        vec![TokenKind::Let, TokenKind::Ident, TokenKind::Var, TokenKind::Eof]
    );
}

#[test]
fn string_literals_and_escapes() {
    let src = r#""hello\n\"there\"""#;
    let (tokens, diags) = Scanner::new("test.aven", src).scan_all();
    assert!(diags.is_empty());
    assert_eq!(tokens[0].kind, TokenKind::StringLit);
    assert_eq!(
        decode_string_literal(tokens[0].text(src)),
        "hello\n\"there\""
    );
}

#[test]
fn unterminated_string_reports() {
    let (tokens, diags) = Scanner::new("test.aven", "\"oops").scan_all();
    assert_eq!(tokens[0].kind, TokenKind::Unknown);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, aven_common::codes::UNTERMINATED_STRING);
}

#[test]
fn unknown_character_reports() {
    let (tokens, diags) = Scanner::new("test.aven", "a # b").scan_all();
    assert_eq!(
        tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
        vec![TokenKind::Ident, TokenKind::Unknown, TokenKind::Ident, TokenKind::Eof]
    );
    assert_eq!(diags[0].code, aven_common::codes::UNEXPECTED_CHARACTER);
}
