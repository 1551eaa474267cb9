use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wordmachine::error::error::{Error, ExpandError};
use wordmachine::expander::expander::expand;
use wordmachine::{build, run_source};
use wordmachine_core::isa::isa::STACK_BASE;
use wordmachine_core::machine::machine::Machine;

// code sits low in memory; keep the stack well clear of it
const STACK_SETUP: &str = "COPY 0x8000 r1\n";
const STACK_TOP: u32 = 0x8000;
const MAX_STEPS: u64 = 1_000_000;

fn run(body: &str) -> Machine {
    let program = format!("{STACK_SETUP}{body}\nstop\n");
    match run_source(&program, MAX_STEPS) {
        Ok(machine) => machine,
        Err(err) => panic!("program failed: {err}\n{program}"),
    }
}

fn reg(machine: &Machine, idx: usize) -> u32 {
    machine.regs.r[idx]
}

fn branch_taken(mnemonic: &str, a: u32, b: u32) -> bool {
    let body = format!(
        "COPY {a} r4
COPY {b} r5
COPY 0 r6
{mnemonic} r4 r5 yes
JUMP done
yes: COPY 1 r6
done: NOTH"
    );
    reg(&run(&body), 6) == 1
}

fn defined_labels(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|token| token.strip_suffix(':'))
        .map(str::to_string)
        .collect()
}

#[test]
fn add_of_two_literals() {
    let machine = run("ADD 0x12 0x13 r4");
    assert_eq!(reg(&machine, 4), 0x25);
}

#[test]
fn full_width_immediates_survive_copy() {
    for value in [0x0, 0xffff_ffff, 0xdead_beef, 0x00aa_bbcc] {
        let machine = run(&format!("COPY {value:#x} r4"));
        assert_eq!(reg(&machine, 4), value, "{value:#x}");
    }
}

#[test]
fn arithmetic_and_bitwise_match_wrapping_ops() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..12 {
        let a: u32 = rng.random();
        let b: u32 = rng.random_range(1..=u32::MAX);
        let machine = run(&format!(
            "COPY {a} r11
COPY {b} r12
ADD r11 r12 r4
SUB r11 r12 r5
MULT r11 r12 r6
DIV r11 r12 r13
AND r11 r12 r14
OR r11 r12 r15
XOR r11 r12 r2
MOD r11 r12 r3"
        ));

        assert_eq!(reg(&machine, 4), a.wrapping_add(b));
        assert_eq!(reg(&machine, 5), a.wrapping_sub(b));
        assert_eq!(reg(&machine, 6), a.wrapping_mul(b));
        assert_eq!(reg(&machine, 13), a / b);
        assert_eq!(reg(&machine, 14), a & b);
        assert_eq!(reg(&machine, 15), a | b);
        assert_eq!(reg(&machine, 2), a ^ b);
        assert_eq!(reg(&machine, 3), a % b);
        assert_eq!(reg(&machine, 1), STACK_TOP);
    }
}

#[test]
fn not_and_neg() {
    let machine = run("NOT 0 r4\nNOT 0x0f0f0f0f r5\nNEG 1 r6\nNEG 0 r11\nNEG 0x80000000 r12");
    assert_eq!(reg(&machine, 4), 0xffff_ffff);
    assert_eq!(reg(&machine, 5), 0xf0f0_f0f0);
    assert_eq!(reg(&machine, 6), 0xffff_ffff);
    assert_eq!(reg(&machine, 11), 0);
    assert_eq!(reg(&machine, 12), 0x8000_0000);
}

#[test]
fn signed_comparisons_across_the_sign_boundary() {
    let mut pairs: Vec<(u32, u32)> = vec![
        (0x7fff_ffff, 0x8000_0002),
        (0x8000_0002, 0x7fff_ffff),
        (0x8000_0000, 0x7fff_ffff),
        (0xffff_ffff, 0),
        (0, 0xffff_ffff),
        (0xffff_fffe, 0xffff_ffff),
        (1, 0),
        (0, 1),
        (5, 5),
        (0x8000_0000, 0x8000_0000),
    ];
    let mut rng = StdRng::seed_from_u64(42);
    pairs.extend((0..6).map(|_| (rng.random::<u32>(), rng.random::<u32>())));

    for (a, b) in pairs {
        let (sa, sb) = (a as i32, b as i32);
        assert_eq!(branch_taken("GJUMP", a, b), sa > sb, "GJUMP {a:#x} {b:#x}");
        assert_eq!(branch_taken("GEJUMP", a, b), sa >= sb, "GEJUMP {a:#x} {b:#x}");
        assert_eq!(branch_taken("LJUMP", a, b), sa < sb, "LJUMP {a:#x} {b:#x}");
        assert_eq!(branch_taken("LEJUMP", a, b), sa <= sb, "LEJUMP {a:#x} {b:#x}");
    }
}

#[test]
fn equality_jumps() {
    for (a, b) in [(3, 3), (3, 4), (0, 0xffff_ffff)] {
        assert_eq!(branch_taken("EJUMP", a, b), a == b);
        assert_eq!(branch_taken("NEJUMP", a, b), a != b);
    }
}

#[test]
fn zero_tests() {
    for value in [0u32, 1, 0x8000_0000] {
        let machine = run(&format!(
            "COPY {value} r4
COPY 0 r5
COPY 0 r6
ZJUMP r4 zero
back: NZJUMP r4 nonzero
JUMP done
zero: COPY 1 r5
JUMP back
nonzero: COPY 1 r6
done: NOTH"
        ));
        assert_eq!(reg(&machine, 5), (value == 0) as u32, "{value:#x}");
        assert_eq!(reg(&machine, 6), (value != 0) as u32, "{value:#x}");
    }
}

#[test]
fn stack_is_last_in_first_out() {
    let machine = run("PUSH 1\nPUSH 0xdeadbeef\nPOP r4\nPOP r5");
    assert_eq!(reg(&machine, 4), 0xdead_beef);
    assert_eq!(reg(&machine, 5), 1);
    assert_eq!(reg(&machine, 1), STACK_TOP);
}

#[test]
fn load_store_and_label_addresses() {
    let program = format!(
        "{STACK_SETUP}COPY table r4
LOAD r4 r5
LOAD r4+4 r6
STORE 0xcafe 0x9000
LOAD 0x9000 r11
COPY table r7
LOAD r7+8 r12
stop
table: 0xdeadbeef
0x12345678
0xfeed
"
    );
    let machine = run_source(&program, MAX_STEPS).unwrap();
    assert_eq!(reg(&machine, 5), 0xdead_beef);
    assert_eq!(reg(&machine, 6), 0x1234_5678);
    assert_eq!(reg(&machine, 11), 0xcafe);
    assert_eq!(reg(&machine, 12), 0xfeed);
}

#[test]
fn conventional_stack_base() {
    let program = format!("COPY {STACK_BASE} r1\nPUSH 0xabcd\nPOP r4\nstop\n");
    let machine = run_source(&program, MAX_STEPS).unwrap();
    let slot = (STACK_BASE - 4) as usize;
    assert_eq!(reg(&machine, 4), 0xabcd);
    assert_eq!(reg(&machine, 1), STACK_BASE);
    assert_eq!(&machine.mem.as_bytes()[slot..slot + 4], &[0, 0, 0xab, 0xcd]);
}

#[test]
fn stack_pointer_operands_see_the_caller_stack() {
    let machine = run("XOR r1+0 0 r4\nXOR r1 0x8001 r5\nXOR r1-4 r1 r6\nEXP 3 r1-0x7ff8 r11\nLSHIFT 1 r1-0x7ffc r12");
    assert_eq!(reg(&machine, 4), 0x8000);
    assert_eq!(reg(&machine, 5), 1);
    assert_eq!(reg(&machine, 6), 0xfffc);
    assert_eq!(reg(&machine, 11), 6561);
    assert_eq!(reg(&machine, 12), 16);
    assert_eq!(reg(&machine, 1), STACK_TOP);
}

#[test]
fn call_arguments_relative_to_the_stack_pointer() {
    let program = format!(
        "{STACK_SETUP}CALL pair r1 r1-4
stop
pair: POP r5
POP r6
RETURN
"
    );
    let machine = run_source(&program, MAX_STEPS).unwrap();
    assert_eq!(reg(&machine, 5), STACK_TOP);
    assert_eq!(reg(&machine, 6), STACK_TOP - 4);
    assert_eq!(reg(&machine, 1), STACK_TOP);
}

#[test]
fn labels_named_like_mnemonics_are_rejected() {
    assert_eq!(
        expand("JUMP NOTH\nNOTH: stop\n"),
        Err(ExpandError::ReservedLabel { line: 1, name: "NOTH".into() })
    );
    assert!(matches!(
        run_source("COPY 0 r4\nJUMP load\nCOPY 1 r4\nload: COPY 2 r5\nstop\n", MAX_STEPS),
        Err(Error::Expand(ExpandError::ReservedLabel { line: 2, .. }))
    ));
    assert!(matches!(
        build("stop: stop\n"),
        Err(Error::Expand(ExpandError::ReservedLabel { line: 1, .. }))
    ));
}

#[test]
fn call_and_return_restore_the_stack() {
    let program = format!(
        "{STACK_SETUP}CALL sum3 2 4 6
COPY r2 r4
stop
sum3: POP r5
POP r6
POP r11
ADD r5 r6 r2
ADD r2 r11 r2
RETURN r2
"
    );
    let machine = run_source(&program, MAX_STEPS).unwrap();
    assert_eq!(reg(&machine, 4), 12);
    assert_eq!(reg(&machine, 1), STACK_TOP);
}

#[test]
fn if_on_a_function_result() {
    let program = format!(
        "{STACK_SETUP}COPY 0 r4
COPY 0 r5
IF ident 7
COPY 1 r4
ENDIF
IF ident 0
COPY 1 r5
ENDIF
stop
ident: POP r6
RETURN r6
"
    );
    let machine = run_source(&program, MAX_STEPS).unwrap();
    assert_eq!(reg(&machine, 4), 1);
    assert_eq!(reg(&machine, 5), 0);
    assert_eq!(reg(&machine, 1), STACK_TOP);
}

#[test]
fn while_runs_body_exactly_n_times() {
    for n in [0u32, 1, 5] {
        let machine = run(&format!(
            "COPY {n} r4
COPY 0 r5
WHILE r4
ADD r5 1 r5
SUB r4 1 r4
ENDWHILE"
        ));
        assert_eq!(reg(&machine, 5), n);
        assert_eq!(reg(&machine, 4), 0);
    }
}

#[test]
fn nested_scopes() {
    // count the odd numbers below 6 with an IF inside a WHILE
    let machine = run(
        "COPY 6 r4
COPY 0 r5
WHILE r4
SUB r4 1 r4
AND r4 1 r6
IF r6
ADD r5 1 r5
ENDIF
ENDWHILE",
    );
    assert_eq!(reg(&machine, 5), 3);
}

#[test]
fn shifts() {
    let machine = run("LSHIFT 3 4 r4\nRSHIFT 0x80000000 31 r5\nLSHIFT 0xabc 0 r6\nRSHIFT 0xff00 8 r11");
    assert_eq!(reg(&machine, 4), 48);
    assert_eq!(reg(&machine, 5), 1);
    assert_eq!(reg(&machine, 6), 0xabc);
    assert_eq!(reg(&machine, 11), 0xff);
    assert_eq!(reg(&machine, 1), STACK_TOP);
}

#[test]
fn exponentiation() {
    let cases = [(3u32, 5u32), (2, 10), (7, 0), (0, 0), (2, 32), (0x10001, 3)];
    for (base, power) in cases {
        let machine = run(&format!("EXP {base} {power} r4"));
        assert_eq!(reg(&machine, 4), base.wrapping_pow(power), "{base}^{power}");
        assert_eq!(reg(&machine, 1), STACK_TOP);
    }
}

#[test]
fn expansion_is_idempotent() {
    let source = "
start: COPY 0x8000 r1
       CALL f 3
loop:  WHILE r2
       SUB r2 1 r2
       ENDWHILE
       GJUMP r4 r5 start
       stop
f:     POP r4
       RETURN r4
";
    let once = expand(source).unwrap();
    assert_eq!(expand(&once).unwrap(), once);
}

#[test]
fn generated_labels_never_collide() {
    let source = "
_unique_1: COPY 0x8000 r1
_unique_3: NZJUMP r4 _unique_1
           NEJUMP r4 r5 _unique_3
           IF r4
           GEJUMP r4 r5 _unique_2
           ENDIF
_unique_2: stop
";
    let lowered = expand(source).unwrap();
    let labels = defined_labels(&lowered);
    let unique: HashSet<&String> = labels.iter().collect();
    assert_eq!(unique.len(), labels.len(), "{lowered}");
    for user in ["_unique_1", "_unique_2", "_unique_3"] {
        assert_eq!(labels.iter().filter(|name| *name == user).count(), 1);
    }
    assert!(build(source).is_ok());
}

#[test]
fn lowered_text_has_no_macros_left() {
    let lowered = expand("COPY 0x8000 r1\nEXP 2 3 r4\nXOR r4 r5 r6\nstop\n").unwrap();
    for line in lowered.lines() {
        let mut tokens = line.split_whitespace();
        let head = match tokens.next() {
            Some(token) if token.ends_with(':') => tokens.next(),
            other => other,
        };
        if let Some(head) = head {
            assert!(!head.chars().all(|c| c.is_ascii_uppercase()), "{line}");
        }
    }
}

#[test]
fn diagnosed_errors() {
    assert!(matches!(
        build("FROB r1 r2"),
        Err(Error::Expand(ExpandError::UnknownMacro { line: 1, .. }))
    ));
    assert!(matches!(
        build("stop\nADD r1 r2"),
        Err(Error::Expand(ExpandError::Arity { line: 2, mnemonic: "ADD", found: 2, .. }))
    ));
    assert!(matches!(
        build("COPY r1 0x10"),
        Err(Error::Expand(ExpandError::ExpectedRegister { mnemonic: "COPY", .. }))
    ));
    assert!(matches!(
        build("ENDIF"),
        Err(Error::Expand(ExpandError::UnmatchedClose { line: 1, mnemonic: "ENDIF" }))
    ));
    assert!(matches!(
        build("stop\nIF r4\nstop"),
        Err(Error::Expand(ExpandError::UnclosedScope { line: 2, mnemonic: "IF", count: 1 }))
    ));
    assert!(matches!(
        build("PUSH r1+"),
        Err(Error::Expand(ExpandError::MalformedOperand { line: 1, .. }))
    ));
}
