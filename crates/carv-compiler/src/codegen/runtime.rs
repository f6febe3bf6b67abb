//! Runtime preface emitter.
//!
//! Writes the fixed C runtime every generated translation unit starts with:
//! arena allocator, primitive typedefs, the string value, per-kind arrays,
//! print/file/string helpers, the tagged result value, and (when the
//! program uses async) the cooperative event loop. TCP helpers and their
//! POSIX headers are emitted only when referenced.

/// Which conditional runtime sections the program needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeFlags {
    pub uses_async: bool,
    pub uses_tcp: bool,
}

/// Emit the complete runtime preface into `out`.
pub fn emit_runtime(out: &mut String, flags: RuntimeFlags) {
    out.push_str(HEADERS);
    if flags.uses_tcp {
        out.push_str(TCP_HEADERS);
    }
    out.push_str(ARENA);
    out.push_str(PRIMITIVES);
    out.push_str(STRING_VALUE);
    out.push_str(ARRAYS);
    out.push_str(PRINT_HELPERS);
    out.push_str(FILE_HELPERS);
    if flags.uses_tcp {
        out.push_str(TCP_HELPERS);
    }
    out.push_str(STRING_OPS);
    out.push_str(RESULT_VALUE);
    if flags.uses_async {
        out.push_str(EVENT_LOOP);
    }
}

const HEADERS: &str = "\
#include <stdio.h>
#include <stdlib.h>
#include <string.h>
#include <stdbool.h>
";

const TCP_HEADERS: &str = "\
#include <unistd.h>
#include <sys/socket.h>
#include <netinet/in.h>
#include <arpa/inet.h>
";

const ARENA: &str = r#"
/* ---- arena ---- */
typedef struct carv_arena_block {
    struct carv_arena_block* next;
    size_t used;
    size_t capacity;
    unsigned char data[];
} carv_arena_block;

static carv_arena_block* carv_arena_head = NULL;

static void* carv_arena_alloc(size_t size) {
    size = (size + 7u) & ~(size_t)7u;
    if (carv_arena_head == NULL || carv_arena_head->used + size > carv_arena_head->capacity) {
        size_t capacity = size > (1u << 20) ? size : (1u << 20);
        carv_arena_block* block = (carv_arena_block*)malloc(sizeof(carv_arena_block) + capacity);
        block->next = carv_arena_head;
        block->used = 0;
        block->capacity = capacity;
        carv_arena_head = block;
    }
    void* p = carv_arena_head->data + carv_arena_head->used;
    carv_arena_head->used += size;
    return p;
}

static void carv_arena_free_all(void) {
    carv_arena_block* block = carv_arena_head;
    while (block != NULL) {
        carv_arena_block* next = block->next;
        free(block);
        block = next;
    }
    carv_arena_head = NULL;
}
"#;

const PRIMITIVES: &str = r#"
/* ---- primitives ---- */
typedef long long carv_int;
typedef double carv_float;
typedef bool carv_bool;
"#;

const STRING_VALUE: &str = r#"
/* ---- string value ---- */
typedef struct {
    const char* data;
    carv_int length;
    bool owned;
} carv_string;

static char* carv_strdup(const char* s, size_t length) {
    char* p = (char*)carv_arena_alloc(length + 1);
    memcpy(p, s, length);
    p[length] = '\0';
    return p;
}

static carv_string carv_string_lit(const char* s) {
    carv_string out = { s, (carv_int)strlen(s), false };
    return out;
}

static carv_string carv_string_own(const char* s, carv_int length) {
    carv_string out = { carv_strdup(s, (size_t)length), length, true };
    return out;
}

static carv_string carv_string_clone(carv_string s) {
    return carv_string_own(s.data, s.length);
}

static carv_string carv_string_move(carv_string* s) {
    carv_string out = *s;
    s->data = NULL;
    s->length = 0;
    s->owned = false;
    return out;
}

static void carv_string_drop(carv_string* s) {
    /* Bytes are arena-backed; dropping clears the value and its flag. */
    if (s->owned) {
        s->data = NULL;
        s->length = 0;
        s->owned = false;
    }
}

static carv_string carv_string_concat(carv_string a, carv_string b) {
    size_t length = (size_t)a.length + (size_t)b.length;
    char* p = (char*)carv_arena_alloc(length + 1);
    memcpy(p, a.data, (size_t)a.length);
    memcpy(p + a.length, b.data, (size_t)b.length);
    p[length] = '\0';
    carv_string out = { p, (carv_int)length, true };
    return out;
}
"#;

const ARRAYS: &str = r#"
/* ---- arrays ---- */
typedef struct {
    carv_int* data;
    carv_int length;
    carv_int capacity;
} carv_int_array;

typedef struct {
    carv_float* data;
    carv_int length;
    carv_int capacity;
} carv_float_array;

typedef struct {
    carv_bool* data;
    carv_int length;
    carv_int capacity;
} carv_bool_array;

typedef struct {
    carv_string* data;
    carv_int length;
    carv_int capacity;
} carv_string_array;

static carv_int_array carv_new_int_array(carv_int length) {
    carv_int_array out = { NULL, length, length };
    out.data = (carv_int*)carv_arena_alloc((size_t)length * sizeof(carv_int));
    memset(out.data, 0, (size_t)length * sizeof(carv_int));
    return out;
}

static carv_float_array carv_new_float_array(carv_int length) {
    carv_float_array out = { NULL, length, length };
    out.data = (carv_float*)carv_arena_alloc((size_t)length * sizeof(carv_float));
    memset(out.data, 0, (size_t)length * sizeof(carv_float));
    return out;
}

static carv_bool_array carv_new_bool_array(carv_int length) {
    carv_bool_array out = { NULL, length, length };
    out.data = (carv_bool*)carv_arena_alloc((size_t)length * sizeof(carv_bool));
    memset(out.data, 0, (size_t)length * sizeof(carv_bool));
    return out;
}

static carv_string_array carv_new_string_array(carv_int length) {
    carv_string_array out = { NULL, length, length };
    out.data = (carv_string*)carv_arena_alloc((size_t)length * sizeof(carv_string));
    memset(out.data, 0, (size_t)length * sizeof(carv_string));
    return out;
}
"#;

const PRINT_HELPERS: &str = r#"
/* ---- print helpers ---- */
static void carv_print_int(carv_int v) { printf("%lld", v); }
static void carv_println_int(carv_int v) { printf("%lld\n", v); }
static void carv_print_float(carv_float v) { printf("%g", v); }
static void carv_println_float(carv_float v) { printf("%g\n", v); }
static void carv_print_bool(carv_bool v) { printf("%s", v ? "true" : "false"); }
static void carv_println_bool(carv_bool v) { printf("%s\n", v ? "true" : "false"); }
static void carv_print_string(carv_string v) { printf("%.*s", (int)v.length, v.data); }
static void carv_println_string(carv_string v) { printf("%.*s\n", (int)v.length, v.data); }

static void carv_print_int_array(carv_int_array v) {
    printf("[");
    for (carv_int i = 0; i < v.length; i++) {
        if (i > 0) printf(", ");
        printf("%lld", v.data[i]);
    }
    printf("]");
}
static void carv_println_int_array(carv_int_array v) { carv_print_int_array(v); printf("\n"); }

static void carv_print_float_array(carv_float_array v) {
    printf("[");
    for (carv_int i = 0; i < v.length; i++) {
        if (i > 0) printf(", ");
        printf("%g", v.data[i]);
    }
    printf("]");
}
static void carv_println_float_array(carv_float_array v) { carv_print_float_array(v); printf("\n"); }

static void carv_print_bool_array(carv_bool_array v) {
    printf("[");
    for (carv_int i = 0; i < v.length; i++) {
        if (i > 0) printf(", ");
        printf("%s", v.data[i] ? "true" : "false");
    }
    printf("]");
}
static void carv_println_bool_array(carv_bool_array v) { carv_print_bool_array(v); printf("\n"); }

static void carv_print_string_array(carv_string_array v) {
    printf("[");
    for (carv_int i = 0; i < v.length; i++) {
        if (i > 0) printf(", ");
        printf("\"%.*s\"", (int)v.data[i].length, v.data[i].data);
    }
    printf("]");
}
static void carv_println_string_array(carv_string_array v) { carv_print_string_array(v); printf("\n"); }
"#;

const FILE_HELPERS: &str = r#"
/* ---- file helpers ---- */
static carv_string carv_read_file(carv_string path) {
    carv_string missing = { NULL, 0, false };
    char* cpath = carv_strdup(path.data, (size_t)path.length);
    FILE* f = fopen(cpath, "rb");
    if (f == NULL) return missing;
    fseek(f, 0, SEEK_END);
    long size = ftell(f);
    fseek(f, 0, SEEK_SET);
    if (size < 0) { fclose(f); return missing; }
    char* buffer = (char*)carv_arena_alloc((size_t)size + 1);
    size_t read = fread(buffer, 1, (size_t)size, f);
    fclose(f);
    buffer[read] = '\0';
    carv_string out = { buffer, (carv_int)read, true };
    return out;
}

static bool carv_write_file(carv_string path, carv_string content) {
    char* cpath = carv_strdup(path.data, (size_t)path.length);
    FILE* f = fopen(cpath, "wb");
    if (f == NULL) return false;
    size_t written = fwrite(content.data, 1, (size_t)content.length, f);
    fclose(f);
    return written == (size_t)content.length;
}

static bool carv_file_exists(carv_string path) {
    char* cpath = carv_strdup(path.data, (size_t)path.length);
    FILE* f = fopen(cpath, "rb");
    if (f == NULL) return false;
    fclose(f);
    return true;
}
"#;

const TCP_HELPERS: &str = r#"
/* ---- tcp helpers ---- */
static carv_int carv_tcp_listen(carv_int port) {
    int fd = socket(AF_INET, SOCK_STREAM, 0);
    if (fd < 0) return -1;
    int reuse = 1;
    setsockopt(fd, SOL_SOCKET, SO_REUSEADDR, &reuse, sizeof(reuse));
    struct sockaddr_in addr;
    memset(&addr, 0, sizeof(addr));
    addr.sin_family = AF_INET;
    addr.sin_addr.s_addr = INADDR_ANY;
    addr.sin_port = htons((unsigned short)port);
    if (bind(fd, (struct sockaddr*)&addr, sizeof(addr)) < 0) { close(fd); return -1; }
    if (listen(fd, 16) < 0) { close(fd); return -1; }
    return (carv_int)fd;
}

static carv_int carv_tcp_accept(carv_int fd) {
    int client = accept((int)fd, NULL, NULL);
    return client < 0 ? -1 : (carv_int)client;
}

static carv_string carv_tcp_read(carv_int fd) {
    carv_string missing = { NULL, 0, false };
    char* buffer = (char*)carv_arena_alloc(4096 + 1);
    long n = (long)recv((int)fd, buffer, 4096, 0);
    if (n < 0) return missing;
    buffer[n] = '\0';
    carv_string out = { buffer, (carv_int)n, true };
    return out;
}

static bool carv_tcp_write(carv_int fd, carv_string data) {
    long n = (long)send((int)fd, data.data, (size_t)data.length, 0);
    return n == (long)data.length;
}

static void carv_tcp_close(carv_int fd) {
    close((int)fd);
}
"#;

const STRING_OPS: &str = r#"
/* ---- string ops ---- */
static carv_string carv_int_to_string(carv_int v) {
    char buffer[32];
    int n = snprintf(buffer, sizeof(buffer), "%lld", v);
    return carv_string_own(buffer, (carv_int)n);
}

static carv_string carv_float_to_string(carv_float v) {
    char buffer[64];
    int n = snprintf(buffer, sizeof(buffer), "%g", v);
    return carv_string_own(buffer, (carv_int)n);
}

static carv_string carv_bool_to_string(carv_bool v) {
    return carv_string_lit(v ? "true" : "false");
}

static carv_string carv_trim(carv_string s) {
    carv_int start = 0;
    carv_int end = s.length;
    while (start < end && (s.data[start] == ' ' || s.data[start] == '\t' ||
                           s.data[start] == '\r' || s.data[start] == '\n')) start++;
    while (end > start && (s.data[end - 1] == ' ' || s.data[end - 1] == '\t' ||
                           s.data[end - 1] == '\r' || s.data[end - 1] == '\n')) end--;
    return carv_string_own(s.data + start, end - start);
}

static carv_string carv_substr(carv_string s, carv_int start, carv_int length) {
    if (start < 0) start = 0;
    if (start > s.length) start = s.length;
    if (length < 0) length = 0;
    if (start + length > s.length) length = s.length - start;
    return carv_string_own(s.data + start, length);
}

static carv_string_array carv_split(carv_string s, carv_string sep) {
    if (sep.length == 0 || s.length == 0) {
        carv_string_array single = carv_new_string_array(1);
        single.data[0] = carv_string_own(s.data, s.length);
        return single;
    }
    carv_int count = 1;
    for (carv_int i = 0; i + sep.length <= s.length; i++) {
        if (memcmp(s.data + i, sep.data, (size_t)sep.length) == 0) {
            count++;
            i += sep.length - 1;
        }
    }
    carv_string_array out = carv_new_string_array(count);
    carv_int part = 0;
    carv_int start = 0;
    for (carv_int i = 0; i + sep.length <= s.length; i++) {
        if (memcmp(s.data + i, sep.data, (size_t)sep.length) == 0) {
            out.data[part++] = carv_string_own(s.data + start, i - start);
            i += sep.length - 1;
            start = i + 1;
        }
    }
    out.data[part] = carv_string_own(s.data + start, s.length - start);
    return out;
}

static carv_string carv_join(carv_string_array parts, carv_string sep) {
    size_t total = 0;
    for (carv_int i = 0; i < parts.length; i++) {
        total += (size_t)parts.data[i].length;
        if (i + 1 < parts.length) total += (size_t)sep.length;
    }
    char* buffer = (char*)carv_arena_alloc(total + 1);
    size_t at = 0;
    for (carv_int i = 0; i < parts.length; i++) {
        memcpy(buffer + at, parts.data[i].data, (size_t)parts.data[i].length);
        at += (size_t)parts.data[i].length;
        if (i + 1 < parts.length) {
            memcpy(buffer + at, sep.data, (size_t)sep.length);
            at += (size_t)sep.length;
        }
    }
    buffer[total] = '\0';
    carv_string out = { buffer, (carv_int)total, true };
    return out;
}
"#;

const RESULT_VALUE: &str = r#"
/* ---- result value ---- */
typedef enum {
    CARV_TAG_INT,
    CARV_TAG_FLOAT,
    CARV_TAG_BOOL,
    CARV_TAG_STR
} carv_value_tag;

typedef union {
    carv_int i;
    carv_float f;
    carv_bool b;
    carv_string s;
} carv_value_union;

typedef struct {
    bool ok_flag;
    carv_value_tag ok_tag;
    carv_value_tag err_tag;
    carv_value_union ok_union;
    carv_value_union err_union;
} carv_result;

static carv_result carv_ok_int(carv_int v) {
    carv_result out;
    memset(&out, 0, sizeof(out));
    out.ok_flag = true;
    out.ok_tag = CARV_TAG_INT;
    out.ok_union.i = v;
    return out;
}

static carv_result carv_ok_float(carv_float v) {
    carv_result out;
    memset(&out, 0, sizeof(out));
    out.ok_flag = true;
    out.ok_tag = CARV_TAG_FLOAT;
    out.ok_union.f = v;
    return out;
}

static carv_result carv_ok_bool(carv_bool v) {
    carv_result out;
    memset(&out, 0, sizeof(out));
    out.ok_flag = true;
    out.ok_tag = CARV_TAG_BOOL;
    out.ok_union.b = v;
    return out;
}

static carv_result carv_ok_str(carv_string v) {
    carv_result out;
    memset(&out, 0, sizeof(out));
    out.ok_flag = true;
    out.ok_tag = CARV_TAG_STR;
    out.ok_union.s = v;
    return out;
}

static carv_result carv_err_str(carv_string v) {
    carv_result out;
    memset(&out, 0, sizeof(out));
    out.ok_flag = false;
    out.err_tag = CARV_TAG_STR;
    out.err_union.s = v;
    return out;
}

static carv_result carv_err_code(carv_int v) {
    carv_result out;
    memset(&out, 0, sizeof(out));
    out.ok_flag = false;
    out.err_tag = CARV_TAG_INT;
    out.err_union.i = v;
    return out;
}
"#;

const EVENT_LOOP: &str = r#"
/* ---- event loop ---- */
struct carv_event_loop;
typedef bool (*carv_poll_fn)(void* frame, struct carv_event_loop* loop);
typedef void (*carv_drop_fn)(void* frame);

typedef struct {
    carv_poll_fn poll;
    carv_drop_fn drop;
    void* frame;
    bool done;
} carv_task;

typedef struct carv_event_loop {
    carv_task* tasks;
    size_t count;
    size_t capacity;
} carv_event_loop;

static carv_event_loop carv_global_loop = { NULL, 0, 0 };

static void carv_loop_push(carv_event_loop* loop, carv_task task) {
    if (loop->count == loop->capacity) {
        size_t capacity = loop->capacity == 0 ? 8 : loop->capacity * 2;
        carv_task* grown = (carv_task*)carv_arena_alloc(capacity * sizeof(carv_task));
        if (loop->count > 0) memcpy(grown, loop->tasks, loop->count * sizeof(carv_task));
        loop->tasks = grown;
        loop->capacity = capacity;
    }
    task.done = false;
    loop->tasks[loop->count++] = task;
}

static void carv_loop_run(carv_event_loop* loop) {
    bool pending = true;
    while (pending) {
        pending = false;
        for (size_t i = 0; i < loop->count; i++) {
            carv_task* task = &loop->tasks[i];
            if (task->done) continue;
            if (task->poll(task->frame, loop)) {
                task->done = true;
                if (task->drop != NULL) task->drop(task->frame);
            } else {
                pending = true;
            }
        }
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_runtime_sections() {
        let mut out = String::new();
        emit_runtime(&mut out, RuntimeFlags::default());
        assert!(out.contains("#include <stdio.h>"));
        assert!(out.contains("typedef long long carv_int;"));
        assert!(out.contains("const char* data;"));
        assert!(out.contains("carv_string_lit"));
        assert!(out.contains("carv_string_clone"));
        assert!(out.contains("carv_string_drop"));
        assert!(out.contains("carv_ok_int"));
        assert!(out.contains("carv_err_str"));
    }

    #[test]
    fn test_event_loop_only_when_async() {
        let mut out = String::new();
        emit_runtime(&mut out, RuntimeFlags::default());
        assert!(!out.contains("carv_event_loop"));

        let mut out = String::new();
        emit_runtime(
            &mut out,
            RuntimeFlags {
                uses_async: true,
                uses_tcp: false,
            },
        );
        assert!(out.contains("carv_loop_run"));
        assert!(out.contains("carv_task"));
    }

    #[test]
    fn test_tcp_headers_only_when_used() {
        let mut out = String::new();
        emit_runtime(&mut out, RuntimeFlags::default());
        assert!(!out.contains("sys/socket.h"));

        let mut out = String::new();
        emit_runtime(
            &mut out,
            RuntimeFlags {
                uses_async: false,
                uses_tcp: true,
            },
        );
        assert!(out.contains("#include <sys/socket.h>"));
        assert!(out.contains("carv_tcp_listen"));
    }

    #[test]
    fn test_runtime_order() {
        let mut out = String::new();
        emit_runtime(
            &mut out,
            RuntimeFlags {
                uses_async: true,
                uses_tcp: true,
            },
        );
        let arena = out.find("carv_arena_alloc").unwrap();
        let string = out.find("carv_string_lit").unwrap();
        let arrays = out.find("carv_new_int_array").unwrap();
        let result = out.find("carv_ok_int").unwrap();
        let evloop = out.find("carv_loop_run").unwrap();
        assert!(arena < string && string < arrays && arrays < result && result < evloop);
    }
}
