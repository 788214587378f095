//! Замена чисел английскими словами перед синтезом
//!
//! Модель плохо читает цифры, поэтому `1984s` превращается в
//! `nineteen eighty-fours`, а `42nd` в `forty-twond`. Суффикс сохраняется
//! как есть.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref NUMBER_WITH_SUFFIX: Regex = Regex::new(r"\b(\d+)([a-zA-Z]*)\b").unwrap();
}

const SMALL: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

/// Число словами; от миллиона и выше возвращаются цифры
pub fn number_to_words(num: u64) -> String {
    match num {
        0..=19 => SMALL[num as usize].to_string(),
        20..=99 => {
            let tens = TENS[(num / 10) as usize];
            match num % 10 {
                0 => tens.to_string(),
                ones => format!("{}-{}", tens, SMALL[ones as usize]),
            }
        }
        100..=999 => {
            let hundreds = SMALL[(num / 100) as usize];
            match num % 100 {
                0 => format!("{} hundred", hundreds),
                rest => format!("{} hundred {}", hundreds, number_to_words(rest)),
            }
        }
        1_000..=999_999 => {
            let thousands = number_to_words(num / 1000);
            match num % 1000 {
                0 => format!("{} thousand", thousands),
                rest => format!("{} thousand {}", thousands, number_to_words(rest)),
            }
        }
        _ => num.to_string(),
    }
}

/// Четырёхзначное число как год
pub fn year_to_words(year: u64) -> String {
    let (high, low) = (year / 100, year % 100);
    if (2000..=2099).contains(&year) {
        return match low {
            0 => "two thousand".to_string(),
            _ => format!("two thousand {}", number_to_words(low)),
        };
    }
    match low {
        0 => format!("{} hundred", number_to_words(high)),
        1..=9 => format!("{} oh {}", number_to_words(high), number_to_words(low)),
        _ => format!("{} {}", number_to_words(high), number_to_words(low)),
    }
}

/// Заменить все числа в тексте словами
pub fn format_numbers(text: &str) -> Cow<'_, str> {
    NUMBER_WITH_SUFFIX.replace_all(text, |caps: &Captures| {
        let digits = &caps[1];
        let suffix = &caps[2];
        let words = match digits.parse::<u64>() {
            Ok(num) if (1000..=9999).contains(&num) => year_to_words(num),
            Ok(num) => number_to_words(num),
            Err(_) => digits.to_string(),
        };
        format!("{}{}", words, suffix)
    })
}
