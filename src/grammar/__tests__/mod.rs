mod container_test;
