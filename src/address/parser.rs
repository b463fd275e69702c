use combine::{
    any, attempt, choice, none_of, satisfy, skip_many, skip_many1, token,
    error::StreamError,
    parser::range::recognize,
    stream::StreamErrorFor,
    ParseError, Parser, RangeStream,
};

pub fn mailbox<'a, Input>() -> impl Parser<Input, Output = &'a str>
where
    Input: RangeStream<Token = char, Range = &'a str>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    choice((
        attempt((display_name(), angle_addr()).map(|(_, addr)| addr)),
        attempt(angle_addr()),
        addr_spec(),
    ))
}

fn display_name<'a, Input>() -> impl Parser<Input, Output = ()>
where
    Input: RangeStream<Token = char, Range = &'a str>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    skip_many1(choice((
        attempt(quoted_string()),
        none_of("<".chars()).map(|_| ()),
    )))
}

// Quoted pairs are skipped wholesale so a display name like
// "Foo <bar>" does not terminate the scan early.
fn quoted_string<'a, Input>() -> impl Parser<Input, Output = ()>
where
    Input: RangeStream<Token = char, Range = &'a str>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        token('"'),
        skip_many(choice((
            (token('\\'), any()).map(|_| ()),
            none_of("\"\\".chars()).map(|_| ()),
        ))),
        token('"'),
    )
        .map(|_| ())
}

fn angle_addr<'a, Input>() -> impl Parser<Input, Output = &'a str>
where
    Input: RangeStream<Token = char, Range = &'a str>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        token('<'),
        recognize(skip_many1(none_of("<>".chars()))),
        token('>'),
    )
        .map(|(_, addr, _): (_, &'a str, _)| addr)
}

fn addr_spec<'a, Input>() -> impl Parser<Input, Output = &'a str>
where
    Input: RangeStream<Token = char, Range = &'a str>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    recognize(skip_many1(satisfy(|c: char| {
        !c.is_whitespace() && c != '<' && c != '>' && c != ','
    })))
    .and_then(|s: &'a str| {
        if s.contains('@') {
            Ok(s)
        } else {
            Err(StreamErrorFor::<Input>::unexpected_static_message(
                "addr-spec",
            ))
        }
    })
}
