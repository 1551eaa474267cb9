pub mod emitter {
    use crate::operand::operand::Operand;
    use crate::program::program::{Body, Line, Program};

    pub const LABEL_WIDTH: usize = 18;
    pub const MNEMONIC_WIDTH: usize = 8;
    pub const OPERAND_WIDTH: usize = 18;

    // pad to width - 1 then always add one space, so an overlong field
    // still stays separated from the next one.
    fn push_field(out: &mut String, text: &str, width: usize) {
        out.push_str(text);
        let pad = width.saturating_sub(1).saturating_sub(text.len());
        out.extend(std::iter::repeat_n(' ', pad + 1));
    }

    pub fn render_line(line: &Line) -> String {
        let mut out = String::new();
        match &line.label {
            Some(name) => push_field(&mut out, &format!("{name}:"), LABEL_WIDTH),
            None => push_field(&mut out, "", LABEL_WIDTH),
        }

        let (mnemonic, operands): (String, &[Operand]) = match &line.body {
            Body::Empty => (String::new(), &[]),
            Body::Data(value) => (value.to_string(), &[]),
            Body::Instruction(instr) => (instr.mnemonic.clone(), &instr.operands),
            Body::Macro(call) => (call.kind.mnemonic().to_string(), &call.operands),
        };

        push_field(&mut out, &mnemonic, MNEMONIC_WIDTH);
        for operand in operands {
            push_field(&mut out, &operand.to_string(), OPERAND_WIDTH);
        }

        out.truncate(out.trim_end().len());
        out
    }

    /// One rendered line per program line, each newline terminated.
    pub fn render(program: &Program) -> String {
        program
            .lines
            .iter()
            .map(|line| render_line(line) + "\n")
            .collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::program::program::parse_line;

        fn round(text: &str) -> String {
            render_line(&parse_line(text, 1).unwrap())
        }

        #[test]
        fn fixed_columns() {
            assert_eq!(
                round("add r7 r8 r9"),
                format!("{:18}{:8}{:18}{:18}r9", "", "add", "r7", "r8")
            );
            assert_eq!(round("loop: copy 16 r4"), format!("{:18}{:8}{:18}r4", "loop:", "copy", "0x10"));
        }

        #[test]
        fn data_sits_in_mnemonic_column() {
            assert_eq!(round("   _unique_4"), format!("{:18}_unique_4", ""));
            assert_eq!(round("14"), format!("{:18}0xe", ""));
        }

        #[test]
        fn long_label_keeps_a_separator() {
            let line = round("a_really_long_label_name: stop");
            assert_eq!(line, "a_really_long_label_name: stop");
        }

        #[test]
        fn bare_label_and_blank_lines_trim() {
            assert_eq!(round("here:"), "here:");
            assert_eq!(round(""), "");
        }
    }
}
