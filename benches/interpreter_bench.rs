use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use muscheme::lexer::tokenize;
use muscheme::parser::parse_program;
use muscheme::{Environment, evaluate, parse_str};

const PROGRAM: &str = r#"
(define (fib n)
  ; naive on purpose
  (if (< n 2)
      n
      (+ (fib (- n 1))
         (fib (- n 2)))))

(define (count-down n)
  (cond ((= n 0) 'done)
        (else (count-down (- n 1)))))

(define (sum-list xs)
  (let loop ((xs xs) (acc 0))
    (if (null? xs) acc (loop (cdr xs) (+ acc (car xs))))))

(fib 10)
(count-down 500)
(sum-list '(1 2 3 4 5 6 7 8 9 10))
'("string with escapes \"\n\t\"" #t #f 123 45.67 -10 +)
"#;

fn bench_reader(c: &mut Criterion) {
    let mut group = c.benchmark_group("reader");
    group.bench_with_input(BenchmarkId::new("tokenize", "program"), &PROGRAM, |b, input| {
        b.iter(|| tokenize(black_box(input)))
    });
    group.bench_with_input(BenchmarkId::new("parse", "program"), &PROGRAM, |b, input| {
        b.iter(|| parse_program(black_box(input)))
    });
    group.finish();
}

fn bench_eval(c: &mut Criterion) {
    let mut group = c.benchmark_group("eval");

    for n in [15.0, 20.0] {
        let env = Environment::new_global_populated();
        for form in parse_program(PROGRAM).expect("bench program parses") {
            evaluate(form, env.clone()).expect("bench program evaluates");
        }
        let call = parse_str(&format!("(fib {})", n)).expect("call parses");
        group.bench_with_input(BenchmarkId::new("fib", n), &call, |b, call| {
            b.iter(|| evaluate(black_box(call.clone()), env.clone()))
        });
    }

    let env = Environment::new_global_populated();
    let tail_loop = parse_str("(define (loop n) (if (= n 0) 'done (loop (- n 1))))")
        .expect("loop parses");
    evaluate(tail_loop, env.clone()).expect("loop defines");
    let call = parse_str("(loop 100000)").expect("call parses");
    group.bench_function("tail_loop_100000", |b| {
        b.iter(|| evaluate(black_box(call.clone()), env.clone()))
    });

    group.finish();
}

criterion_group!(benches, bench_reader, bench_eval);
criterion_main!(benches);
