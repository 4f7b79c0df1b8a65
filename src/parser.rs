use chrono::NaiveDate;
use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_until, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map_res, opt, rest},
    sequence::{delimited, preceded, tuple},
    IResult,
};

#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Ask {
        question: String,
        k: Option<usize>,
    },
    Add {
        json: String,
    },
    Import {
        path: String,
    },
    List {
        category: Option<String>,
        merchant: Option<String>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    Stats,
    Help,
    Exit,
}

// --- BASIC PARSERS ---

fn parse_usize(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}

fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let (input, content) = take_until("\"")(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, content.to_string()))
}

fn parse_date(input: &str) -> IResult<&str, NaiveDate> {
    let (input, date_str) = take_while1(|c: char| c.is_ascii_digit() || c == '-')(input)?;
    match NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        Ok(date) => Ok((input, date)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(
    inner: F,
) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where
    F: FnMut(&'a str) -> IResult<&'a str, O, E>,
{
    delimited(multispace0, inner, multispace0)
}

fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| tag_no_case(t)(input)
}

// --- COMMAND PARSERS ---

fn parse_ask(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("ASK")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, question) = parse_quoted_string(input)?;
    let (input, k) = opt(preceded(ws(tag_ci("TOP")), parse_usize))(input)?;
    Ok((input, Command::Ask { question, k }))
}

fn parse_add(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("ADD")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, json) = rest(input)?;

    let json = json.trim();
    if !json.starts_with('{') {
        return Err(nom::Err::Error(nom::error::Error::new(
            json,
            nom::error::ErrorKind::Char,
        )));
    }
    Ok((input, Command::Add {
        json: json.to_string(),
    }))
}

fn parse_import(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("IMPORT")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, path) = parse_quoted_string(input)?;
    Ok((input, Command::Import { path }))
}

fn parse_list(input: &str) -> IResult<&str, Command> {
    let (mut input, _) = tag_ci("LIST")(input)?;

    let mut category = None;
    let mut merchant = None;
    let mut from = None;
    let mut to = None;

    // Clauses may appear in any order, each at most once; a repeated clause
    // is left unconsumed and rejected by the remainder check.
    loop {
        if category.is_none() {
            if let Ok((rest_input, value)) = preceded(
                tuple((multispace1, tag_ci("CATEGORY"), multispace1)),
                parse_quoted_string,
            )(input)
            {
                category = Some(value);
                input = rest_input;
                continue;
            }
        }
        if merchant.is_none() {
            if let Ok((rest_input, value)) = preceded(
                tuple((multispace1, tag_ci("MERCHANT"), multispace1)),
                parse_quoted_string,
            )(input)
            {
                merchant = Some(value);
                input = rest_input;
                continue;
            }
        }
        if from.is_none() {
            if let Ok((rest_input, value)) = preceded(
                tuple((multispace1, tag_ci("FROM"), multispace1)),
                parse_date,
            )(input)
            {
                from = Some(value);
                input = rest_input;
                continue;
            }
        }
        if to.is_none() {
            if let Ok((rest_input, value)) = preceded(
                tuple((multispace1, tag_ci("TO"), multispace1)),
                parse_date,
            )(input)
            {
                to = Some(value);
                input = rest_input;
                continue;
            }
        }
        break;
    }

    Ok((input, Command::List {
        category,
        merchant,
        from,
        to,
    }))
}

fn parse_stats(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("STATS")(input)?;
    Ok((input, Command::Stats))
}

fn parse_help(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("HELP")(input)?;
    Ok((input, Command::Help))
}

fn parse_exit(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("EXIT"), tag_ci("QUIT")))(input)?;
    Ok((input, Command::Exit))
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let result = alt((
        parse_ask,
        parse_add,
        parse_import,
        parse_list,
        parse_stats,
        parse_help,
        parse_exit,
    ))(input);

    match result {
        Ok((remainder, cmd)) => {
            if !remainder.trim().is_empty() {
                return Err(format!("Unexpected tokens at end: '{}'", remainder));
            }
            Ok(cmd)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            // e.input contains the slice where parsing failed
            let context = if e.input.len() > 20 {
                format!("{}...", &e.input[..20])
            } else {
                e.input.to_string()
            };
            Err(format!("Invalid syntax near: '{}'", context))
        }
        Err(nom::Err::Incomplete(_)) => Err("Incomplete command.".to_string()),
    }
}
