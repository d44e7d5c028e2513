//! End-to-end programs exercising the whole pipeline: assemble source,
//! load it, run against in-memory collaborators, inspect the effects.

use weft::{
    assemble, BufferedOut, CaptureDisplay, Host, MemFs, Register, RunState, StopReason,
    DISPLAY_HEIGHT, DISPLAY_WIDTH,
};

fn run_program(src: &str, arg: Option<&str>) -> (RunState, BufferedOut, CaptureDisplay) {
    let image = assemble(src).expect("program should assemble");
    let out = BufferedOut::new();
    let display = CaptureDisplay::new();
    let host = Host::sandboxed(MemFs::new(), display.clone(), out.clone());
    let mut state = RunState::new(&image, host, arg).expect("program should load");
    let stop = state.run_budgeted(10_000_000).expect("program should not fault");
    assert_eq!(stop, StopReason::Halted, "program exceeded its step budget");
    (state, out, display)
}

const COUNTDOWN: &str = r#"
        JMP main
default_n: DB "3", '\0'
main:
        CMP AX, 0
        JNE have_arg
        MOV AX, default_n
have_arg:
        SYSCALL ATOI
        MOV CX, AX
        CMP CX, 0
        JE done
count:
        MOV AX, CX
        SYSCALL PRINT_INT
        MOV AX, '\n'
        SYSCALL PRINT_CHAR
        LOOP count
done:
        HALT
"#;

#[test]
fn countdown_with_argument() {
    let (_, out, _) = run_program(COUNTDOWN, Some("3"));
    assert_eq!(out.contents(), "3\n2\n1\n");
}

#[test]
fn countdown_falls_back_to_default() {
    // No argument: AX starts 0 and the program uses its baked-in "3"
    let (_, out, _) = run_program(COUNTDOWN, None);
    assert_eq!(out.contents(), "3\n2\n1\n");
}

#[test]
fn countdown_with_larger_argument() {
    let (_, out, _) = run_program(COUNTDOWN, Some("5"));
    assert_eq!(out.contents(), "5\n4\n3\n2\n1\n");
}

#[test]
fn factorial_of_five() {
    let src = r#"
main:
        MOV CX, 5
        MOV AX, 1
fact:
        MUL CX
        LOOP fact
        SYSCALL PRINT_INT
        MOV AX, '\n'
        SYSCALL PRINT_CHAR
        HALT
"#;
    let (_, out, _) = run_program(src, None);
    assert_eq!(out.contents(), "120\n");
}

#[test]
fn first_ten_fibonacci_numbers() {
    let src = r#"
main:
        MOV CX, 10
        MOV AX, 0           ; a
        MOV BX, 1           ; b
next:
        SYSCALL PRINT_INT
        MOV EX, AX          ; syscalls leave EX alone
        MOV AX, '\n'
        SYSCALL PRINT_CHAR
        MOV DX, EX
        ADD DX, BX          ; a + b
        MOV AX, BX
        MOV BX, DX
        LOOP next
        HALT
"#;
    let (_, out, _) = run_program(src, None);
    assert_eq!(out.contents(), "0\n1\n1\n2\n3\n5\n8\n13\n21\n34\n");
}

/// One Game of Life generation over a 40x36 word grid. `count_neighbors`
/// and `update_world` use the full stack calling convention: arguments
/// pushed right to left, locals below the frame pointer.
const GAME_OF_LIFE: &str = r#"
.MEMORY 16384
        JMP main

count_neighbors:                ; ([FP+4] = x, [FP+6] = y) -> AX
        PUSH FP
        MOV FP, SP
        SUB SP, 6               ; [FP-2] count, [FP-4] dy, [FP-6] dx
        MOV [FP-2], 0
        MOV [FP-4], -1
cn_row:
        MOV [FP-6], -1
cn_col:
        MOV AX, [FP-4]
        CMP AX, 0
        JNE cn_check
        MOV AX, [FP-6]
        CMP AX, 0
        JE cn_next              ; skip the cell itself
cn_check:
        MOV BX, [FP+4]
        ADD BX, [FP-6]          ; nx
        CMP BX, 0
        JL cn_next
        CMP BX, 40
        JGE cn_next
        MOV DX, [FP+6]
        ADD DX, [FP-4]          ; ny
        CMP DX, 0
        JL cn_next
        CMP DX, 36
        JGE cn_next
        MOV AX, DX
        MUL 40
        ADD AX, BX
        ADD AX, AX              ; cell index to byte offset
        ADD AX, world
        MOV BX, AX
        MOV AX, [BX]
        ADD [FP-2], AX
cn_next:
        INC [FP-6]
        MOV AX, [FP-6]
        CMP AX, 2
        JL cn_col
        INC [FP-4]
        MOV AX, [FP-4]
        CMP AX, 2
        JL cn_row
        MOV AX, [FP-2]
        MOV SP, FP
        POP FP
        RET

update_world:
        PUSH FP
        MOV FP, SP
        SUB SP, 4               ; [FP-2] y, [FP-4] x
        MOV [FP-2], 0
uw_row:
        MOV [FP-4], 0
uw_col:
        PUSH [FP-2]
        PUSH [FP-4]
        CALL count_neighbors
        ADD SP, 4
        MOV FX, AX              ; neighbor count
        MOV AX, [FP-2]
        MUL 40
        ADD AX, [FP-4]
        ADD AX, AX
        MOV EX, AX              ; byte offset of this cell
        ADD AX, world
        MOV BX, AX
        MOV DX, [BX]            ; current state
        MOV AX, 0               ; next state
        CMP FX, 3
        JE uw_alive             ; three neighbors: alive either way
        CMP FX, 2
        JNE uw_store            ; not two or three: dies or stays dead
        CMP DX, 1
        JNE uw_store            ; dead with two: stays dead
uw_alive:
        MOV AX, 1
uw_store:
        MOV BX, EX
        ADD BX, new_world
        MOV [BX], AX
        INC [FP-4]
        MOV AX, [FP-4]
        CMP AX, 40
        JL uw_col
        INC [FP-2]
        MOV AX, [FP-2]
        CMP AX, 36
        JL uw_row
        MOV SP, FP
        POP FP
        RET

main:
        ; seed a glider: (1,0) (2,1) (0,2) (1,2) (2,2)
        MOV BX, world
        ADD BX, 2
        MOV [BX], 1
        MOV BX, world
        ADD BX, 84
        MOV [BX], 1
        MOV BX, world
        ADD BX, 160
        MOV [BX], 1
        MOV BX, world
        ADD BX, 162
        MOV [BX], 1
        MOV BX, world
        ADD BX, 164
        MOV [BX], 1

        PUSH 3                  ; y
        PUSH 1                  ; x
        CALL count_neighbors
        ADD SP, 4
        MOV [probe], AX

        CALL update_world
        HALT

probe:     DW 0
world:     DW 0 DUP(1440)
new_world: DW 0 DUP(1440)
"#;

#[test]
fn game_of_life_one_generation() {
    let image = assemble(GAME_OF_LIFE).unwrap();
    let (state, _, _) = run_program(GAME_OF_LIFE, None);

    // Data region order: probe, world, new_world
    let probe = image.code_len() as u16;
    let world = probe + 2;
    let new_world = world + 2880;

    // Interior cell (1,3) had exactly three live neighbors before the step
    assert_eq!(state.read_word(probe).unwrap(), 3);

    // The glider's next generation, computed cell by cell
    let expected: &[(u16, u16)] = &[(0, 1), (2, 1), (1, 2), (2, 2), (1, 3)];
    let mut alive = Vec::new();
    for y in 0..36u16 {
        for x in 0..40u16 {
            let addr = new_world + (y * 40 + x) * 2;
            if state.read_word(addr).unwrap() == 1 {
                alive.push((x, y));
            }
        }
    }
    assert_eq!(alive, expected);

    // Spot checks against the rules: a live cell with one neighbor died,
    // live cells with two or three neighbors survived, a dead cell with
    // three neighbors was born
    let cell = |x: u16, y: u16| {
        let addr = new_world + (y * 40 + x) * 2;
        state.read_word(addr).unwrap()
    };
    assert_eq!(cell(1, 0), 0, "one neighbor dies");
    assert_eq!(cell(2, 1), 1, "three neighbors survives");
    assert_eq!(cell(2, 2), 1, "two neighbors survives");
    assert_eq!(cell(0, 1), 1, "dead cell with three neighbors is born");
}

#[test]
fn corner_to_corner_line_is_continuous() {
    let src = r#"
main:
        MOV AX, 3
        SYSCALL SET_COLOR
        MOV AX, 0
        MOV BX, 0
        MOV CX, 159
        MOV DX, 143
        SYSCALL DRAW_LINE
        SYSCALL PAINT_DISPLAY
        SYSCALL EXIT
"#;
    let (_, _, display) = run_program(src, None);
    let frame = display.last_frame().expect("PAINT_DISPLAY presented a frame");

    // Touches both corners
    assert_eq!(frame.get(0, 0), 3);
    assert_eq!(frame.get(DISPLAY_WIDTH - 1, DISPLAY_HEIGHT - 1), 3);

    // dx exceeds dy, so every column holds exactly one pixel and the path
    // descends monotonically with no gaps
    let mut last_y = 0;
    for x in 0..DISPLAY_WIDTH {
        let ys: Vec<i32> = (0..DISPLAY_HEIGHT)
            .filter(|&y| frame.get(x, y) != 0)
            .collect();
        assert_eq!(ys.len(), 1, "column {x} should hold exactly one pixel");
        assert!(ys[0] >= last_y && ys[0] - last_y <= 1, "gap at column {x}");
        last_y = ys[0];
    }
}

#[test]
fn read_file_feeds_guest_logic() {
    // The guest reads a count from a file and prints that many dots;
    // a missing file falls back to one dot. Mirrors the corpus pattern
    // of branching on AX = -1.
    let src = r#"
        JMP main
name:   DB "count.txt", '\0'
buf:    DB 0 DUP(8)
main:
        MOV AX, name
        MOV BX, buf
        MOV CX, 7
        SYSCALL READ_FILE
        CMP AX, -1
        JE fallback
        MOV AX, buf
        SYSCALL ATOI
        MOV CX, AX
        JMP print
fallback:
        MOV CX, 1
print:
        MOV AX, '.'
        SYSCALL PRINT_CHAR
        LOOP print
        HALT
"#;
    let image = assemble(src).unwrap();
    let mut fs = MemFs::new();
    fs.insert("count.txt", b"4".to_vec());
    let out = BufferedOut::new();
    let host = Host::sandboxed(fs, CaptureDisplay::new(), out.clone());
    let mut state = RunState::new(&image, host, None).unwrap();
    state.run().unwrap();
    assert_eq!(out.contents(), "....");

    // Same program, no file: exactly one dot
    let out = BufferedOut::new();
    let host = Host::sandboxed(MemFs::new(), CaptureDisplay::new(), out.clone());
    let mut state = RunState::new(&image, host, None).unwrap();
    state.run().unwrap();
    assert_eq!(out.contents(), ".");
}

#[test]
fn registers_preserved_across_drawing_calls() {
    // The corpus keeps loop counters in EX/FX across syscalls instead of
    // spilling them; the runtime must honor that
    let src = r#"
main:
        MOV EX, 3
        MOV FX, 77
frame:
        MOV AX, 2
        SYSCALL SET_COLOR
        MOV AX, 10
        MOV BX, 10
        MOV CX, 20
        SYSCALL DRAW_CIRCLE
        SYSCALL PAINT_DISPLAY
        DEC EX
        MOV AX, EX
        CMP AX, 0
        JG frame
        HALT
"#;
    let (state, _, display) = run_program(src, None);
    assert_eq!(display.present_count(), 3);
    assert_eq!(state.reg(Register::Fx), 77);
}
