#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use tailguard_collector::rule::TimeFormat;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    format: String,
    value: String,
    year: i32,
}

fuzz_target!(|input: FuzzInput| {
    // 형식 컴파일 실패는 정상적인 거절
    let Ok(format) = TimeFormat::compile(&input.format) else {
        return;
    };
    let _ = format.parse(&input.value);
    let _ = format.parse_with_year(&input.value, input.year.rem_euclid(10_000));
});
